//! Message intake abstractions.
//!
//! A [`MessageSource`] hands the ingestion pipeline one [`Delivery`] at a
//! time. The pipeline decides per delivery whether to acknowledge it or to
//! abandon it; abandoned deliveries are left to the transport's own
//! redelivery policy. The pipeline never retries a message itself.
//!
//! Implementations:
//!
//! - [`MqttSource`]: QoS 1 subscription with manual acknowledgement;
//!   abandoned messages come back after a forced session reconnect.
//! - [`MemoryBroker`]: in-process broker used by tests.

mod memory;
mod mqtt;

use std::{fmt, sync::Arc};

use bytes::Bytes;

use crate::error::TransportError;

pub use memory::{MemoryBroker, MemorySubscription};
pub use mqtt::MqttSource;

/// Settles a single delivery with the transport that produced it.
#[async_trait::async_trait]
pub trait Acknowledge: Send {
    /// Confirm processing; the transport must not redeliver.
    async fn ack(self: Box<Self>) -> Result<(), TransportError>;

    /// Give up on the message without confirming it.
    async fn abandon(self: Box<Self>);
}

/// One inbound message together with its settlement handle.
pub struct Delivery {
    pub topic: Arc<str>,
    pub payload: Bytes,
    settle: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(topic: impl Into<Arc<str>>, payload: Bytes, settle: Box<dyn Acknowledge>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            settle,
        }
    }

    pub async fn ack(self) -> Result<(), TransportError> {
        self.settle.ack().await
    }

    /// Leave the message unacknowledged so the transport may redeliver it.
    pub async fn abandon(self) {
        self.settle.abandon().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait MessageSource: Send {
    /// Wait for the next delivery. `Ok(None)` means the source is closed.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, TransportError>;

    /// Release the transport once every delivery it produced is settled.
    async fn close(&mut self) {}
}
