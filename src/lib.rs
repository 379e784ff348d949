pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod stats;
pub mod store;
pub mod transport;
