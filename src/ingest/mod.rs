//! Device payload intake: normalisation and the consumer pipeline.

pub mod normalizer;
pub mod pipeline;

pub use normalizer::{Normalized, Normalizer, PayloadProfile};
pub use pipeline::{FailureReason, IngestionPipeline, Outcome};
