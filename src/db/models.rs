use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The five sensor partitions. Every reading belongs to exactly one.
///
/// Each class maps to its own table (see [`SensorClass::table_name`]);
/// queries never span classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SensorClass {
    Rain,
    Temperature,
    Light,
    Humidity,
    Smoke,
}

impl SensorClass {
    pub const ALL: [SensorClass; 5] = [
        SensorClass::Rain,
        SensorClass::Temperature,
        SensorClass::Light,
        SensorClass::Humidity,
        SensorClass::Smoke,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorClass::Rain => "rain",
            SensorClass::Temperature => "temperature",
            SensorClass::Light => "light",
            SensorClass::Humidity => "humidity",
            SensorClass::Smoke => "smoke",
        }
    }

    /// Backing table for this partition.
    pub fn table_name(self) -> &'static str {
        match self {
            SensorClass::Rain => "rain_sensor",
            SensorClass::Temperature => "temp_sensor",
            SensorClass::Light => "light_sensor",
            SensorClass::Humidity => "humidity_sensor",
            SensorClass::Smoke => "smoke_sensor",
        }
    }

    /// Default title used when a payload does not name its device.
    pub fn default_title(self) -> &'static str {
        match self {
            SensorClass::Rain => "Rain Sensor",
            SensorClass::Temperature => "Temperature Sensor",
            SensorClass::Light => "Light Sensor",
            SensorClass::Humidity => "Humidity Sensor",
            SensorClass::Smoke => "Smoke Sensor",
        }
    }

    /// Stable position in [`SensorClass::ALL`].
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SensorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        SensorClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown sensor class: {s:?}"))
    }
}

/// A measured value: a continuous quantity or an on/off status.
///
/// Serialised untagged, so clients see a plain JSON number or boolean.
/// `Flag` comes first so `true`/`false` never deserialise as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ReadingValue {
    Flag(bool),
    Numeric(f64),
}

impl ReadingValue {
    /// Numeric view used by aggregates: flags count as `1.0` / `0.0`.
    pub fn as_f64(self) -> f64 {
        match self {
            ReadingValue::Flag(v) => f64::from(u8::from(v)),
            ReadingValue::Numeric(v) => v,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ReadingValue::Flag(v) => Some(v),
            ReadingValue::Numeric(_) => None,
        }
    }

    pub fn as_number(self) -> Option<f64> {
        match self {
            ReadingValue::Numeric(v) => Some(v),
            ReadingValue::Flag(_) => None,
        }
    }
}

impl From<f64> for ReadingValue {
    fn from(v: f64) -> Self {
        ReadingValue::Numeric(v)
    }
}

impl From<bool> for ReadingValue {
    fn from(v: bool) -> Self {
        ReadingValue::Flag(v)
    }
}

/// One immutable, timestamped measurement. Corrections are new readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub sensor_class: SensorClass,
    /// Human-readable label; usually carries the node/device identifier.
    pub title: String,
    pub value: ReadingValue,
    /// When the measurement was taken (ingestion time if the device omitted it).
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        sensor_class: SensorClass,
        title: impl Into<String>,
        value: impl Into<ReadingValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sensor_class,
            title: title.into(),
            value: value.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_class_from_str_roundtrip() {
        for class in SensorClass::ALL {
            assert_eq!(class.as_str().parse::<SensorClass>().unwrap(), class);
        }
    }

    #[test]
    fn sensor_class_unknown_errors() {
        let err = "pressure".parse::<SensorClass>().unwrap_err();
        assert!(err.to_string().contains("unknown sensor class"));
    }

    #[test]
    fn index_matches_position_in_all() {
        for (i, class) in SensorClass::ALL.into_iter().enumerate() {
            assert_eq!(class.index(), i);
        }
    }

    #[test]
    fn flag_value_serialises_as_plain_bool() {
        let flag = serde_json::to_value(ReadingValue::Flag(true)).unwrap();
        assert_eq!(flag, serde_json::json!(true));
        let numeric = serde_json::to_value(ReadingValue::Numeric(25.5)).unwrap();
        assert_eq!(numeric, serde_json::json!(25.5));
    }

    #[test]
    fn flag_counts_as_one_or_zero() {
        assert_eq!(ReadingValue::Flag(true).as_f64(), 1.0);
        assert_eq!(ReadingValue::Flag(false).as_f64(), 0.0);
        assert_eq!(ReadingValue::Numeric(3.5).as_f64(), 3.5);
    }
}
