use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ReadingStore, WindowStats};
use crate::{
    db::models::{Reading, SensorClass},
    error::StoreResult,
};

/// In-memory reading store, one timestamp-ordered `Vec` per sensor class.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Each partition has its own `tokio::sync::RwLock`, so appends to different
/// classes never contend and readers never block each other.
#[derive(Clone, Default)]
pub struct MemoryReadingStore {
    partitions: Arc<[RwLock<Vec<Reading>>; 5]>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, class: SensorClass) -> &RwLock<Vec<Reading>> {
        &self.partitions[class.index()]
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryReadingStore {
    /// Inserts after any reading with an equal timestamp, so ties keep
    /// arrival order.
    async fn append(&self, reading: &Reading) -> StoreResult<()> {
        let mut part = self.partition(reading.sensor_class).write().await;
        let at = part.partition_point(|r| r.timestamp <= reading.timestamp);
        part.insert(at, reading.clone());
        Ok(())
    }

    async fn latest(&self, class: SensorClass) -> StoreResult<Option<Reading>> {
        Ok(self.partition(class).read().await.last().cloned())
    }

    async fn range(
        &self,
        class: SensorClass,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Reading>> {
        let part = self.partition(class).read().await;
        let start = part.partition_point(|r| r.timestamp < since);
        Ok(part[start..]
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn window_stats(
        &self,
        class: SensorClass,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<WindowStats>> {
        let part = self.partition(class).read().await;
        let start = part.partition_point(|r| r.timestamp < since);
        Ok(WindowStats::from_values(
            part[start..].iter().map(|r| r.value.as_f64()),
        ))
    }

    async fn count(&self, class: SensorClass) -> StoreResult<u64> {
        Ok(self.partition(class).read().await.len() as u64)
    }

    async fn clear(&self, class: SensorClass) -> StoreResult<u64> {
        let mut part = self.partition(class).write().await;
        let removed = part.len() as u64;
        part.clear();
        Ok(removed)
    }
}
