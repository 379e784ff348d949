use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value};

use crate::{
    db::models::{Reading, ReadingValue, SensorClass},
    error::MalformedPayload,
};

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Which payload shape a deployment consumes. The two are mutually
/// exclusive; a pipeline never switches shape per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadProfile {
    /// Shape A: `device_id` plus one metric for a fixed class.
    SingleMetric(SensorClass),
    /// Shape B: optional `timestamp`, `temperature`, `humidity`, `is_dark`,
    /// `is_raining`, `is_smoke`.
    MultiMetric,
}

impl FromStr for PayloadProfile {
    type Err = anyhow::Error;

    /// Accepts `multi_metric` or `single_metric:<class>`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.split_once(':') {
            None if s == "multi_metric" => Ok(Self::MultiMetric),
            Some(("single_metric", class)) => {
                let class = class
                    .trim()
                    .parse::<SensorClass>()
                    .with_context(|| format!("bad class in ingest profile {s:?}"))?;
                Ok(Self::SingleMetric(class))
            }
            _ => Err(anyhow::anyhow!(
                "ingest profile must be 'multi_metric' or 'single_metric:<class>', got: {s:?}"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Numeric,
    Flag,
}

/// Shape B field table, in output order.
const MULTI_METRIC_FIELDS: [(&str, SensorClass, FieldKind); 5] = [
    ("temperature", SensorClass::Temperature, FieldKind::Numeric),
    ("humidity", SensorClass::Humidity, FieldKind::Numeric),
    ("is_dark", SensorClass::Light, FieldKind::Flag),
    ("is_raining", SensorClass::Rain, FieldKind::Flag),
    ("is_smoke", SensorClass::Smoke, FieldKind::Flag),
];

/// Shape A metric keys accepted for each class.
fn single_metric_keys(class: SensorClass) -> &'static [&'static str] {
    match class {
        SensorClass::Rain => &["rain", "is_raining"],
        SensorClass::Temperature => &["temperature"],
        SensorClass::Light => &["light", "is_dark"],
        SensorClass::Humidity => &["humidity"],
        SensorClass::Smoke => &["smoke", "is_smoke"],
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Readings produced from one payload, plus the fields that were rejected.
#[derive(Debug, Default)]
pub struct Normalized {
    pub readings: Vec<Reading>,
    pub rejected: Vec<MalformedPayload>,
}

/// Turns raw device JSON into typed readings.
///
/// Pure and stateless: safe to call from any number of concurrent handlers.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    profile: PayloadProfile,
}

impl Normalizer {
    pub fn new(profile: PayloadProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> PayloadProfile {
        self.profile
    }

    /// Normalise `payload`, using `now` wherever the device omitted a timestamp.
    ///
    /// Fails outright when the payload is not an object, when the timestamp is
    /// unusable, or (Shape A) when `device_id` or the metric is bad. In
    /// Shape B a bad metric only rejects that field.
    pub fn normalize(
        &self,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<Normalized, MalformedPayload> {
        let obj = payload
            .as_object()
            .ok_or_else(|| MalformedPayload::new("<root>", "must be a JSON object"))?;
        let timestamp = extract_timestamp(obj, now)?;

        match self.profile {
            PayloadProfile::SingleMetric(class) => single_metric(obj, class, timestamp),
            PayloadProfile::MultiMetric => Ok(multi_metric(obj, timestamp)),
        }
    }
}

fn single_metric(
    obj: &Map<String, Value>,
    class: SensorClass,
    timestamp: DateTime<Utc>,
) -> Result<Normalized, MalformedPayload> {
    let title = device_title(obj)
        .ok_or_else(|| MalformedPayload::new("device_id", "is required and must be a string"))?;

    let keys = single_metric_keys(class);
    let (key, raw) = keys
        .iter()
        .find_map(|k| present(obj, k).map(|v| (*k, v)))
        .ok_or_else(|| MalformedPayload::new(keys[0], "is required"))?;
    let value = coerce_any(key, raw)?;

    Ok(Normalized {
        readings: vec![Reading::new(class, title, value, timestamp)],
        rejected: Vec::new(),
    })
}

fn multi_metric(obj: &Map<String, Value>, timestamp: DateTime<Utc>) -> Normalized {
    let device = device_title(obj);
    let mut out = Normalized::default();

    for (key, class, kind) in MULTI_METRIC_FIELDS {
        let value = match kind {
            FieldKind::Numeric => {
                extract_number(obj, key).map(|v| ReadingValue::Numeric(v.unwrap_or(0.0)))
            }
            FieldKind::Flag => {
                extract_flag(obj, key).map(|v| ReadingValue::Flag(v.unwrap_or(false)))
            }
        };

        match value {
            Ok(value) => {
                let title = device.clone().unwrap_or_else(|| class.default_title().to_owned());
                out.readings.push(Reading::new(class, title, value, timestamp));
            }
            Err(e) => out.rejected.push(e),
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// Field value, treating JSON `null` as absent.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn device_title(obj: &Map<String, Value>) -> Option<String> {
    match present(obj, "device_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_number(key: &str, raw: &Value) -> Result<f64, MalformedPayload> {
    let v = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match v {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(MalformedPayload::new(
            key,
            format!("expected a number, got {} {raw}", json_type(raw)),
        )),
    }
}

fn parse_flag(key: &str, raw: &Value) -> Result<bool, MalformedPayload> {
    let v = match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Some(false),
            Some(v) if v == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };

    v.ok_or_else(|| {
        MalformedPayload::new(key, format!("expected a boolean, got {} {raw}", json_type(raw)))
    })
}

fn extract_number(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>, MalformedPayload> {
    present(obj, key).map(|raw| parse_number(key, raw)).transpose()
}

fn extract_flag(obj: &Map<String, Value>, key: &str) -> Result<Option<bool>, MalformedPayload> {
    present(obj, key).map(|raw| parse_flag(key, raw)).transpose()
}

/// Shape A metrics keep whatever kind the device sent: booleans (and
/// boolean words) become flags, everything numeric becomes a number.
fn coerce_any(key: &str, raw: &Value) -> Result<ReadingValue, MalformedPayload> {
    match raw {
        Value::Bool(b) => Ok(ReadingValue::Flag(*b)),
        Value::String(s) if s.trim().parse::<f64>().is_err() => {
            parse_flag(key, raw).map(ReadingValue::Flag)
        }
        _ => parse_number(key, raw).map(ReadingValue::Numeric),
    }
}

/// Years a timestamp may fall in; anything else cannot be stored.
const TIMESTAMP_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// `timestamp` as Unix epoch seconds (number or numeric string) or RFC 3339.
fn extract_timestamp(
    obj: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, MalformedPayload> {
    let Some(raw) = present(obj, "timestamp") else {
        return Ok(now);
    };

    let parsed = match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    };
    let timestamp = match parsed {
        Some(dt) => dt,
        None => {
            let secs = parse_number("timestamp", raw)?;
            epoch_seconds(secs).ok_or_else(|| {
                MalformedPayload::new("timestamp", format!("{secs} is out of range"))
            })?
        }
    };

    if !TIMESTAMP_YEARS.contains(&timestamp.year()) {
        return Err(MalformedPayload::new(
            "timestamp",
            format!("{} is outside years 1 to 9999", timestamp.to_rfc3339()),
        ));
    }
    Ok(timestamp)
}

fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn multi() -> Normalizer {
        Normalizer::new(PayloadProfile::MultiMetric)
    }

    fn value_of(n: &Normalized, class: SensorClass) -> ReadingValue {
        n.readings
            .iter()
            .find(|r| r.sensor_class == class)
            .map(|r| r.value)
            .unwrap()
    }

    #[test]
    fn profile_from_str() {
        assert_eq!("multi_metric".parse::<PayloadProfile>().unwrap(), PayloadProfile::MultiMetric);
        assert_eq!(
            "single_metric:temperature".parse::<PayloadProfile>().unwrap(),
            PayloadProfile::SingleMetric(SensorClass::Temperature)
        );
        assert!("single_metric:pressure".parse::<PayloadProfile>().is_err());
        assert!("both".parse::<PayloadProfile>().is_err());
    }

    #[test]
    fn full_multi_metric_payload_yields_five_readings() {
        let payload = json!({
            "timestamp": 1700000000,
            "temperature": 25.5,
            "humidity": 60,
            "is_dark": true,
            "is_raining": false,
            "is_smoke": false
        });

        let n = multi().normalize(&payload, now()).unwrap();
        assert_eq!(n.readings.len(), 5);
        assert!(n.rejected.is_empty());

        let expected = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert!(n.readings.iter().all(|r| r.timestamp == expected));

        assert_eq!(value_of(&n, SensorClass::Light), ReadingValue::Flag(true));
        assert_eq!(value_of(&n, SensorClass::Rain), ReadingValue::Flag(false));
        assert_eq!(value_of(&n, SensorClass::Smoke), ReadingValue::Flag(false));
        assert_eq!(value_of(&n, SensorClass::Temperature), ReadingValue::Numeric(25.5));
        assert_eq!(value_of(&n, SensorClass::Humidity), ReadingValue::Numeric(60.0));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let n = multi().normalize(&json!({ "temperature": 20.0 }), now()).unwrap();

        assert_eq!(n.readings.len(), 5);
        assert_eq!(value_of(&n, SensorClass::Humidity), ReadingValue::Numeric(0.0));
        assert_eq!(value_of(&n, SensorClass::Rain), ReadingValue::Flag(false));
        assert_eq!(value_of(&n, SensorClass::Light), ReadingValue::Flag(false));
        assert!(n.readings.iter().all(|r| r.timestamp == now()));
    }

    #[test]
    fn null_counts_as_missing() {
        let n = multi().normalize(&json!({ "humidity": null }), now()).unwrap();
        assert_eq!(value_of(&n, SensorClass::Humidity), ReadingValue::Numeric(0.0));
    }

    #[test]
    fn bad_field_is_rejected_alone() {
        let payload = json!({ "temperature": "warm", "humidity": 40, "is_dark": "maybe" });
        let n = multi().normalize(&payload, now()).unwrap();

        assert_eq!(n.readings.len(), 3);
        let rejected: Vec<_> = n.rejected.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(rejected, vec!["temperature", "is_dark"]);
        assert_eq!(value_of(&n, SensorClass::Humidity), ReadingValue::Numeric(40.0));
    }

    #[test]
    fn permissive_coercion() {
        let payload = json!({
            "temperature": " 21.5 ",
            "humidity": "55",
            "is_dark": 1,
            "is_raining": "TRUE",
            "is_smoke": "0"
        });
        let n = multi().normalize(&payload, now()).unwrap();

        assert!(n.rejected.is_empty());
        assert_eq!(value_of(&n, SensorClass::Temperature), ReadingValue::Numeric(21.5));
        assert_eq!(value_of(&n, SensorClass::Humidity), ReadingValue::Numeric(55.0));
        assert_eq!(value_of(&n, SensorClass::Light), ReadingValue::Flag(true));
        assert_eq!(value_of(&n, SensorClass::Rain), ReadingValue::Flag(true));
        assert_eq!(value_of(&n, SensorClass::Smoke), ReadingValue::Flag(false));
    }

    #[test]
    fn nan_strings_are_not_numbers() {
        let n = multi().normalize(&json!({ "temperature": "NaN" }), now()).unwrap();
        assert_eq!(n.rejected.len(), 1);
        assert_eq!(n.rejected[0].field, "temperature");
    }

    #[test]
    fn titles_use_device_id_or_class_default() {
        let n = multi().normalize(&json!({ "device_id": "pi-04" }), now()).unwrap();
        assert!(n.readings.iter().all(|r| r.title == "pi-04"));

        let n = multi().normalize(&json!({}), now()).unwrap();
        let rain = n.readings.iter().find(|r| r.sensor_class == SensorClass::Rain).unwrap();
        assert_eq!(rain.title, "Rain Sensor");
    }

    #[test]
    fn timestamp_formats() {
        let n = multi().normalize(&json!({ "timestamp": "1700000000.5" }), now()).unwrap();
        assert_eq!(n.readings[0].timestamp.timestamp_millis(), 1_700_000_000_500);

        let n = multi()
            .normalize(&json!({ "timestamp": "2023-11-14T23:13:20+01:00" }), now())
            .unwrap();
        let expected = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(n.readings[0].timestamp, expected);
    }

    #[test]
    fn bad_timestamp_fails_whole_payload() {
        let err = multi()
            .normalize(&json!({ "timestamp": "yesterday", "temperature": 20 }), now())
            .unwrap_err();
        assert_eq!(err.field, "timestamp");

        let err = multi().normalize(&json!({ "timestamp": 1e30 }), now()).unwrap_err();
        assert_eq!(err.field, "timestamp");
    }

    #[test]
    fn timestamps_outside_storable_years_fail() {
        // Representable as a chrono timestamp but far before year 1.
        let err = multi()
            .normalize(&json!({ "timestamp": -3e11, "temperature": 20 }), now())
            .unwrap_err();
        assert_eq!(err.field, "timestamp");

        let err = multi()
            .normalize(&json!({ "timestamp": "+10000-01-01T00:00:00Z" }), now())
            .unwrap_err();
        assert_eq!(err.field, "timestamp");

        let n = multi()
            .normalize(&json!({ "timestamp": "0001-01-01T00:00:00Z" }), now())
            .unwrap();
        assert_eq!(n.readings[0].timestamp.year(), 1);
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let err = multi().normalize(&json!([1, 2, 3]), now()).unwrap_err();
        assert_eq!(err.field, "<root>");
    }

    #[test]
    fn single_metric_yields_one_reading() {
        let payload = json!({ "device_id": "node-7", "temperature": 19.25, "humidity": 80 });
        let n = Normalizer::new(PayloadProfile::SingleMetric(SensorClass::Temperature))
            .normalize(&payload, now())
            .unwrap();

        assert_eq!(n.readings.len(), 1);
        let r = &n.readings[0];
        assert_eq!(r.sensor_class, SensorClass::Temperature);
        assert_eq!(r.title, "node-7");
        assert_eq!(r.value, ReadingValue::Numeric(19.25));
        assert_eq!(r.timestamp, now());
    }

    #[test]
    fn single_metric_accepts_alias_and_keeps_flag_kind() {
        let n = Normalizer::new(PayloadProfile::SingleMetric(SensorClass::Rain))
            .normalize(&json!({ "device_id": "node-1", "is_raining": true }), now())
            .unwrap();
        assert_eq!(n.readings[0].value, ReadingValue::Flag(true));

        let n = Normalizer::new(PayloadProfile::SingleMetric(SensorClass::Rain))
            .normalize(&json!({ "device_id": "node-1", "rain": "2.5" }), now())
            .unwrap();
        assert_eq!(n.readings[0].value, ReadingValue::Numeric(2.5));
    }

    #[test]
    fn single_metric_missing_parts_fail_whole_payload() {
        let normalizer = Normalizer::new(PayloadProfile::SingleMetric(SensorClass::Temperature));

        let err = normalizer.normalize(&json!({ "temperature": 20 }), now()).unwrap_err();
        assert_eq!(err.field, "device_id");

        let err = normalizer.normalize(&json!({ "device_id": "n1" }), now()).unwrap_err();
        assert_eq!(err.field, "temperature");

        let err = normalizer
            .normalize(&json!({ "device_id": "n1", "temperature": "hot" }), now())
            .unwrap_err();
        assert_eq!(err.field, "temperature");
    }
}
