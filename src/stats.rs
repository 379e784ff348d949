//! Windowed statistics computed on read.

use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::{
    db::models::{Reading, ReadingValue, SensorClass},
    error::{StatsError, StoreResult},
    store::StorePtr,
};

/// Maximum number of readings returned by a history query.
pub const HISTORY_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Day boundary
// ---------------------------------------------------------------------------

/// Where "today" starts for the rain total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    /// Midnight in the server's local timezone.
    #[default]
    Local,
    /// Midnight UTC.
    Utc,
}

impl DayBoundary {
    pub fn start_of_day(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DayBoundary::Utc => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
            DayBoundary::Local => {
                let local = now.with_timezone(&Local);
                let midnight = local.date_naive().and_time(NaiveTime::MIN);
                match Local.from_local_datetime(&midnight).earliest() {
                    Some(start) => start.with_timezone(&Utc),
                    // Midnight skipped by a DST jump: measure back from now.
                    None => now - local.time().signed_duration_since(NaiveTime::MIN),
                }
            }
        }
    }
}

impl FromStr for DayBoundary {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            other => Err(anyhow::anyhow!("day boundary must be 'local' or 'utc', got: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Latest value of a class plus aggregates over the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummary {
    pub sensor_class: SensorClass,
    pub title: String,
    pub value: ReadingValue,
    pub timestamp: DateTime<Utc>,
    pub min: f64,
    pub max: f64,
    /// Rain only: sum of today's readings.
    pub total_today: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorStatus {
    pub sensor_class: SensorClass,
    pub active: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// `true` iff the latest reading is no older than `threshold`.
pub fn is_active(latest: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    now.signed_duration_since(latest) <= threshold
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WindowedAggregator {
    store: StorePtr,
    day_boundary: DayBoundary,
}

impl WindowedAggregator {
    pub fn new(store: StorePtr, day_boundary: DayBoundary) -> Self {
        Self { store, day_boundary }
    }

    /// Latest reading plus min/max over `window` ending at `now`.
    ///
    /// An empty window falls back to the latest value for both bounds.
    /// Returns [`StatsError::NoData`] when the class has never reported.
    pub async fn summarize(
        &self,
        class: SensorClass,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<SensorSummary, StatsError> {
        let latest = self
            .store
            .latest(class)
            .await?
            .ok_or(StatsError::NoData(class))?;

        let (min, max) = match self.store.window_stats(class, now - window).await? {
            Some(stats) => (stats.min, stats.max),
            None => (latest.value.as_f64(), latest.value.as_f64()),
        };

        let total_today = match class {
            SensorClass::Rain => Some(self.total_today(now).await?),
            _ => None,
        };

        Ok(SensorSummary {
            sensor_class: class,
            title: latest.title,
            value: latest.value,
            timestamp: latest.timestamp,
            min,
            max,
            total_today,
        })
    }

    /// Sum of rain readings since the start of the current day; `0.0` when
    /// nothing has been recorded today.
    pub async fn total_today(&self, now: DateTime<Utc>) -> StoreResult<f64> {
        let since = self.day_boundary.start_of_day(now);
        Ok(self
            .store
            .window_stats(SensorClass::Rain, since)
            .await?
            .map_or(0.0, |stats| stats.sum))
    }

    /// Ascending readings in the window, at most [`HISTORY_LIMIT`] of them.
    pub async fn history(
        &self,
        class: SensorClass,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>> {
        self.store.range(class, now - window, Some(HISTORY_LIMIT)).await
    }

    /// Active/stale status of every class.
    pub async fn status(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> StoreResult<Vec<SensorStatus>> {
        let mut out = Vec::with_capacity(SensorClass::ALL.len());
        for class in SensorClass::ALL {
            let last_seen = self.store.latest(class).await?.map(|r| r.timestamp);
            out.push(SensorStatus {
                sensor_class: class,
                active: last_seen.is_some_and(|ts| is_active(ts, now, threshold)),
                last_seen,
            });
        }
        Ok(out)
    }
}
