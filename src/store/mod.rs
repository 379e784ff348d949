//! Per-class reading storage.
//!
//! A [`ReadingStore`] is an append-only log partitioned by [`SensorClass`].
//! Readings are never updated in place; the only removal is a bulk
//! [`clear`](ReadingStore::clear) of a whole partition.
//!
//! Two implementations live here:
//!
//! - [`PgReadingStore`]: one Postgres table per class.
//! - [`MemoryReadingStore`]: in-process, one lock per class, used by tests
//!   and by `STORE_BACKEND=memory` deployments.

mod memory;
mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db::models::{Reading, SensorClass},
    error::StoreResult,
};

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

/// Shared handle injected into the pipeline and the query layer.
pub type StorePtr = Arc<dyn ReadingStore>;

/// Aggregates over the readings of one partition since some instant.
///
/// Flag values take part as `1.0` / `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl WindowStats {
    /// Fold values into stats; `None` when the iterator is empty.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| {
            Some(match acc {
                None => WindowStats {
                    count: 1,
                    min: v,
                    max: v,
                    sum: v,
                },
                Some(s) => WindowStats {
                    count: s.count + 1,
                    min: s.min.min(v),
                    max: s.max.max(v),
                    sum: s.sum + v,
                },
            })
        })
    }
}

#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Append `reading` to the partition named by its `sensor_class`.
    async fn append(&self, reading: &Reading) -> StoreResult<()>;

    /// Most recent reading by timestamp, or `None` if the partition is empty.
    async fn latest(&self, class: SensorClass) -> StoreResult<Option<Reading>>;

    /// Readings with `timestamp >= since`, ascending, at most `limit` of them.
    async fn range(
        &self,
        class: SensorClass,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Reading>>;

    /// Count/min/max/sum over readings with `timestamp >= since`.
    async fn window_stats(
        &self,
        class: SensorClass,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<WindowStats>>;

    async fn count(&self, class: SensorClass) -> StoreResult<u64>;

    /// Remove every reading in the partition; returns how many were removed.
    async fn clear(&self, class: SensorClass) -> StoreResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_stats_empty_is_none() {
        assert!(WindowStats::from_values(std::iter::empty()).is_none());
    }

    #[test]
    fn window_stats_folds_min_max_sum() {
        let s = WindowStats::from_values([3.0, -1.5, 7.25]).unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.min, -1.5);
        assert_eq!(s.max, 7.25);
        assert_eq!(s.sum, 8.75);
    }
}
