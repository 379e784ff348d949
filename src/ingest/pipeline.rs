use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};

use super::normalizer::Normalizer;
use crate::{
    error::{MalformedPayload, StoreError, TransportError},
    store::StorePtr,
    transport::{Delivery, MessageSource},
};

/// Bytes of payload quoted in log lines.
const EXCERPT_LEN: usize = 256;

/// Final state of one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// At least one reading was written; the message is acknowledged.
    Acknowledged {
        persisted: usize,
        failed: usize,
        rejected: Vec<MalformedPayload>,
    },
    /// Nothing was written; the message is left for transport redelivery.
    Failed(FailureReason),
}

impl Outcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Outcome::Acknowledged { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The payload was not valid JSON.
    Decode(String),
    /// The payload as a whole was unusable.
    Malformed(MalformedPayload),
    /// Every field was rejected, by the normalizer or by the store.
    NoReadings { rejected: Vec<MalformedPayload> },
    /// Every write failed.
    StoreUnavailable { attempted: usize },
}

/// Stateless consumer: decode → normalise → persist → settle.
///
/// Cheap to clone; clones share the store handle. Holds no per-message
/// state, so any number of messages may be handled concurrently.
#[derive(Clone)]
pub struct IngestionPipeline {
    store: StorePtr,
    normalizer: Normalizer,
}

impl IngestionPipeline {
    pub fn new(store: StorePtr, normalizer: Normalizer) -> Self {
        Self { store, normalizer }
    }

    pub async fn handle_payload(&self, payload: &[u8]) -> Outcome {
        self.handle_payload_at(payload, Utc::now()).await
    }

    /// Run one payload through the pipeline; `now` stamps readings whose
    /// payload carried no timestamp.
    ///
    /// Readings are written independently: a failed write is logged and the
    /// remaining readings are still attempted. A reading the store refuses
    /// outright is reported with the rejected fields rather than as a failure.
    pub async fn handle_payload_at(&self, payload: &[u8], now: DateTime<Utc>) -> Outcome {
        let excerpt = excerpt(payload);

        let value: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    payload = %excerpt,
                    error = %e,
                    "Payload is not valid JSON; leaving unacknowledged"
                );
                return Outcome::Failed(FailureReason::Decode(e.to_string()));
            }
        };

        let normalized = match self.normalizer.normalize(&value, now) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    payload = %excerpt,
                    field = %e.field,
                    reason = %e.reason,
                    "Malformed payload; leaving unacknowledged"
                );
                return Outcome::Failed(FailureReason::Malformed(e));
            }
        };

        for rejected in &normalized.rejected {
            warn!(
                payload = %excerpt,
                field = %rejected.field,
                reason = %rejected.reason,
                "Field rejected"
            );
        }

        if normalized.readings.is_empty() {
            warn!(payload = %excerpt, "Payload produced no readings; leaving unacknowledged");
            return Outcome::Failed(FailureReason::NoReadings {
                rejected: normalized.rejected,
            });
        }

        let attempted = normalized.readings.len();
        let mut rejected = normalized.rejected;
        let mut persisted = 0;
        let mut unavailable = 0;
        for reading in &normalized.readings {
            match self.store.append(reading).await {
                Ok(()) => {
                    persisted += 1;
                    debug!(
                        class = %reading.sensor_class,
                        value = ?reading.value,
                        title = %reading.title,
                        "Reading persisted"
                    );
                }
                Err(StoreError::Rejected(reason)) => {
                    warn!(
                        class = %reading.sensor_class,
                        payload = %excerpt,
                        %reason,
                        "Store refused reading"
                    );
                    rejected.push(MalformedPayload::new(reading.sensor_class.as_str(), reason));
                }
                Err(e) => {
                    unavailable += 1;
                    error!(
                        class = %reading.sensor_class,
                        payload = %excerpt,
                        error = %e,
                        "Failed to persist reading"
                    );
                }
            }
        }

        if persisted == 0 {
            if unavailable == 0 {
                warn!(payload = %excerpt, "Store refused every reading; leaving unacknowledged");
                return Outcome::Failed(FailureReason::NoReadings { rejected });
            }
            error!(payload = %excerpt, attempted, "No reading persisted; leaving unacknowledged");
            return Outcome::Failed(FailureReason::StoreUnavailable { attempted });
        }

        info!(
            payload = %excerpt,
            persisted,
            failed = unavailable,
            rejected = rejected.len(),
            "Message ingested"
        );
        Outcome::Acknowledged {
            persisted,
            failed: unavailable,
            rejected,
        }
    }

    /// Handle a transport delivery and settle it according to the outcome.
    pub async fn handle_delivery(&self, delivery: Delivery) -> Outcome {
        let outcome = self.handle_payload(&delivery.payload).await;
        let topic = Arc::clone(&delivery.topic);

        if outcome.is_acknowledged() {
            if let Err(e) = delivery.ack().await {
                error!(topic = %topic, error = %e, "Failed to acknowledge message");
            }
        } else {
            delivery.abandon().await;
        }

        outcome
    }

    /// Consume `source` until it closes or `shutdown` resolves.
    ///
    /// Up to `max_in_flight` deliveries are handled concurrently. On shutdown
    /// the pending pull is cancelled (nothing it would have returned is
    /// acknowledged) and handlers already started are drained. The source is
    /// closed once every started handler has settled its delivery.
    pub async fn run<S, F>(
        &self,
        mut source: S,
        max_in_flight: usize,
        shutdown: F,
    ) -> Result<(), TransportError>
    where
        S: MessageSource,
        F: Future<Output = ()>,
    {
        let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        info!(max_in_flight, "Ingestion loop started");

        let result = loop {
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(()),
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Message handler task failed");
                    }
                    continue;
                }
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break Ok(()),
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(()),
                next = source.next_delivery() => match next {
                    Ok(Some(d)) => d,
                    Ok(None) => {
                        info!("Message source closed");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                },
            };

            let pipeline = self.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                pipeline.handle_delivery(delivery).await;
            });
        };

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Message handler task failed");
            }
        }

        source.close().await;
        info!("Ingestion loop stopped");
        result
    }
}

fn excerpt(payload: &[u8]) -> String {
    String::from_utf8_lossy(&payload[..payload.len().min(EXCERPT_LEN)]).into_owned()
}
