use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::{Reading, ReadingValue, SensorClass},
    error::MalformedPayload,
    stats::{SensorStatus, SensorSummary},
};

/// Latest reading of a class with window aggregates.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorSummaryDto {
    /// Number, or boolean for status-style sensors.
    pub value: ReadingValue,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    /// Minimum over the window. Booleans count as 0/1.
    pub min: f64,
    pub max: f64,
    /// Rain only: sum of today's readings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_today: Option<f64>,
}

impl From<SensorSummary> for SensorSummaryDto {
    fn from(s: SensorSummary) -> Self {
        Self {
            value: s.value,
            timestamp: s.timestamp,
            title: s.title,
            min: s.min,
            max: s.max,
            total_today: s.total_today,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryPointDto {
    pub value: ReadingValue,
    pub timestamp: DateTime<Utc>,
}

impl From<Reading> for HistoryPointDto {
    fn from(r: Reading) -> Self {
        Self {
            value: r.value,
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorStatusDto {
    pub sensor_class: SensorClass,
    /// Reported within the activity threshold.
    pub active: bool,
    /// Timestamp of the latest reading; `null` if the class never reported.
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<SensorStatus> for SensorStatusDto {
    fn from(s: SensorStatus) -> Self {
        Self {
            sensor_class: s.sensor_class,
            active: s.active,
            last_seen: s.last_seen,
        }
    }
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassCountDto {
    pub sensor_class: SensorClass,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearResultDto {
    pub sensor_class: SensorClass,
    /// Readings removed.
    pub deleted: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassStatsDto {
    pub sensor_class: SensorClass,
    pub count: u64,
    pub latest: Option<HistoryPointDto>,
}

// ---------------------------------------------------------------------------
// Push ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RejectedFieldDto {
    pub field: String,
    pub reason: String,
}

impl From<MalformedPayload> for RejectedFieldDto {
    fn from(e: MalformedPayload) -> Self {
        Self {
            field: e.field,
            reason: e.reason,
        }
    }
}

/// Response for `POST /data/api/sensor-data`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponseDto {
    /// Always `"success"`.
    pub status: String,
    pub persisted: usize,
    /// Fields that could not be used; their siblings were still stored.
    pub rejected: Vec<RejectedFieldDto>,
}

/// Multi-metric device payload. Every field is optional; `timestamp` is
/// epoch seconds or RFC 3339 and defaults to the time of receipt.
///
/// Documentation only: the endpoint accepts the raw body so malformed
/// fields are reported per field instead of failing extraction.
#[derive(Debug, Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct SensorPayloadDto {
    pub device_id: Option<String>,
    #[schema(value_type = Option<String>)]
    pub timestamp: Option<serde_json::Value>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub is_dark: Option<bool>,
    pub is_raining: Option<bool>,
    pub is_smoke: Option<bool>,
}
