use std::str::FromStr;

use anyhow::{Context, Result};

use crate::{ingest::PayloadProfile, stats::DayBoundary};

// ---------------------------------------------------------------------------
// StoreBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Non-durable; for demos and local development.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("unknown store backend: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// e.g. `mqtt://localhost:1883`
    pub broker_url: String,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Required when `store_backend` is Postgres.
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub server_host: String,
    pub server_port: u16,
    /// Payload shape this deployment consumes.
    pub ingest_profile: PayloadProfile,
    /// MQTT intake; `None` leaves only the HTTP push endpoint.
    pub mqtt: Option<MqttConfig>,
    /// Messages handled concurrently by the consumer loop.
    pub max_in_flight: usize,
    /// Default trailing window for statistics and history, in hours.
    pub window_hours: u32,
    /// A class is active if it reported within this many seconds.
    pub active_threshold_secs: u64,
    pub day_boundary: DayBoundary,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store_backend: StoreBackend = optional(&get, "STORE_BACKEND", "postgres")
            .parse()
            .context("STORE_BACKEND must be 'postgres' or 'memory'")?;

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(required(&get, "DATABASE_URL")?),
            StoreBackend::Memory => get("DATABASE_URL"),
        };

        let mqtt = match get("MQTT_BROKER_URL").filter(|s| !s.trim().is_empty()) {
            Some(broker_url) => Some(MqttConfig {
                broker_url,
                topic: optional(&get, "MQTT_TOPIC", "sensor-data"),
                client_id: optional(&get, "MQTT_CLIENT_ID", "sensor-hub"),
                keep_alive_secs: optional(&get, "MQTT_KEEP_ALIVE_SECS", "30")
                    .parse()
                    .context("MQTT_KEEP_ALIVE_SECS must be a positive integer")?,
            }),
            None => None,
        };

        Ok(Self {
            database_url,
            store_backend,
            server_host: optional(&get, "SERVER_HOST", "0.0.0.0"),
            server_port: optional(&get, "SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            ingest_profile: optional(&get, "INGEST_PROFILE", "multi_metric")
                .parse()
                .context("INGEST_PROFILE is invalid")?,
            mqtt,
            max_in_flight: optional(&get, "MAX_IN_FLIGHT", "16")
                .parse()
                .context("MAX_IN_FLIGHT must be a positive integer")?,
            window_hours: optional(&get, "WINDOW_HOURS", "24")
                .parse()
                .context("WINDOW_HOURS must be a positive integer")?,
            active_threshold_secs: optional(&get, "ACTIVE_THRESHOLD_SECS", "300")
                .parse()
                .context("ACTIVE_THRESHOLD_SECS must be a positive integer")?,
            day_boundary: optional(&get, "DAY_BOUNDARY", "local")
                .parse()
                .context("DAY_BOUNDARY is invalid")?,
        })
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    get(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get(key).unwrap_or_else(|| default.to_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::db::models::SensorClass;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_with_database_url() {
        let c = config_from(&[("DATABASE_URL", "postgres://localhost/iotdb")]).unwrap();
        assert_eq!(c.store_backend, StoreBackend::Postgres);
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/iotdb"));
        assert_eq!(c.server_port, 8080);
        assert_eq!(c.ingest_profile, PayloadProfile::MultiMetric);
        assert!(c.mqtt.is_none());
        assert_eq!(c.max_in_flight, 16);
        assert_eq!(c.window_hours, 24);
        assert_eq!(c.active_threshold_secs, 300);
        assert_eq!(c.day_boundary, DayBoundary::Local);
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let c = config_from(&[("STORE_BACKEND", "memory")]).unwrap();
        assert_eq!(c.store_backend, StoreBackend::Memory);
        assert!(c.database_url.is_none());
    }

    #[test]
    fn mqtt_section_enabled_by_broker_url() {
        let c = config_from(&[
            ("STORE_BACKEND", "memory"),
            ("MQTT_BROKER_URL", "mqtt://broker:1883"),
            ("MQTT_TOPIC", "farm/sensors"),
        ])
        .unwrap();
        let mqtt = c.mqtt.unwrap();
        assert_eq!(mqtt.broker_url, "mqtt://broker:1883");
        assert_eq!(mqtt.topic, "farm/sensors");
        assert_eq!(mqtt.client_id, "sensor-hub");
        assert_eq!(mqtt.keep_alive_secs, 30);
    }

    #[test]
    fn single_metric_profile_and_utc_boundary() {
        let c = config_from(&[
            ("STORE_BACKEND", "memory"),
            ("INGEST_PROFILE", "single_metric:temperature"),
            ("DAY_BOUNDARY", "utc"),
        ])
        .unwrap();
        assert_eq!(c.ingest_profile, PayloadProfile::SingleMetric(SensorClass::Temperature));
        assert_eq!(c.day_boundary, DayBoundary::Utc);
    }

    #[test]
    fn invalid_values_error() {
        assert!(config_from(&[("STORE_BACKEND", "mongo")]).is_err());
        assert!(config_from(&[("STORE_BACKEND", "memory"), ("SERVER_PORT", "99999")]).is_err());
        let vars = [("STORE_BACKEND", "memory"), ("INGEST_PROFILE", "shape_c")];
        assert!(config_from(&vars).is_err());
    }
}
