use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, RwLock};

use super::{Acknowledge, Delivery, MessageSource};
use crate::error::TransportError;

/// In-process broker.
///
/// Publishing fans a payload out to every subscription on the exact topic.
/// Acknowledged payloads are recorded; abandoned ones are parked until
/// [`redeliver`](MemoryBroker::redeliver) re-publishes them, which stands in
/// for a real broker's redelivery timer.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    subscriptions: RwLock<HashMap<String, Vec<mpsc::Sender<Bytes>>>>,
    acked: Mutex<Vec<Bytes>>,
    abandoned: Mutex<Vec<(Arc<str>, Bytes)>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. Publishes made after this returns are delivered to it.
    pub async fn subscribe(&self, topic: &str) -> MemorySubscription {
        let (tx, rx) = mpsc::channel(64);
        self.inner
            .subscriptions
            .write()
            .await
            .entry(topic.to_owned())
            .or_default()
            .push(tx);

        MemorySubscription {
            topic: Arc::from(topic),
            inbox: rx,
            broker: self.clone(),
        }
    }

    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) {
        let payload = payload.into();
        let subs = self.inner.subscriptions.read().await;
        if let Some(senders) = subs.get(topic) {
            for tx in senders {
                // A closed channel means the subscription was dropped.
                let _ = tx.send(payload.clone()).await;
            }
        }
    }

    /// Drop every subscription; their sources then report closed.
    pub async fn close(&self) {
        self.inner.subscriptions.write().await.clear();
    }

    pub async fn acked(&self) -> Vec<Bytes> {
        self.inner.acked.lock().await.clone()
    }

    pub async fn abandoned(&self) -> Vec<Bytes> {
        self.inner
            .abandoned
            .lock()
            .await
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Re-publish every abandoned payload; returns how many were re-sent.
    pub async fn redeliver(&self) -> usize {
        let parked = std::mem::take(&mut *self.inner.abandoned.lock().await);
        let count = parked.len();
        for (topic, payload) in parked {
            self.publish(&topic, payload).await;
        }
        count
    }
}

pub struct MemorySubscription {
    topic: Arc<str>,
    inbox: mpsc::Receiver<Bytes>,
    broker: MemoryBroker,
}

#[async_trait::async_trait]
impl MessageSource for MemorySubscription {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, TransportError> {
        Ok(self.inbox.recv().await.map(|payload| {
            let settle = MemorySettle {
                broker: self.broker.clone(),
                topic: Arc::clone(&self.topic),
                payload: payload.clone(),
            };
            Delivery::new(Arc::clone(&self.topic), payload, Box::new(settle))
        }))
    }
}

struct MemorySettle {
    broker: MemoryBroker,
    topic: Arc<str>,
    payload: Bytes,
}

#[async_trait::async_trait]
impl Acknowledge for MemorySettle {
    async fn ack(self: Box<Self>) -> Result<(), TransportError> {
        self.broker.inner.acked.lock().await.push(self.payload);
        Ok(())
    }

    async fn abandon(self: Box<Self>) {
        self.broker
            .inner
            .abandoned
            .lock()
            .await
            .push((self.topic, self.payload));
    }
}
