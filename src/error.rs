use thiserror::Error;

use crate::db::models::SensorClass;

/// A payload (or one of its fields) could not be turned into a reading.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed payload: field `{field}` {reason}")]
pub struct MalformedPayload {
    pub field: String,
    pub reason: String,
}

impl MalformedPayload {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a [`ReadingStore`](crate::store::ReadingStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage medium could not be reached or failed the operation.
    /// Retrying later may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(sqlx::Error),

    /// The store refused this reading's data. Retrying cannot succeed.
    #[error("reading rejected by store: {0}")]
    Rejected(String),

    /// A stored row could not be mapped back to a reading.
    #[error("corrupt row in {class} partition: {reason}")]
    Corrupt { class: SensorClass, reason: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            // SQLSTATE class 22 (data exception) and 23 (integrity violation).
            sqlx::Error::Database(db)
                if db
                    .code()
                    .is_some_and(|code| code.starts_with("22") || code.starts_with("23")) =>
            {
                StoreError::Rejected(db.message().to_owned())
            }
            sqlx::Error::Encode(_) => StoreError::Rejected(e.to_string()),
            _ => StoreError::Unavailable(e),
        }
    }
}

/// Errors raised by the windowed aggregator.
#[derive(Error, Debug)]
pub enum StatsError {
    /// The partition holds no readings at all.
    #[error("no data for sensor class {0}")]
    NoData(SensorClass),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by a [`MessageSource`](crate::transport::MessageSource).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("invalid broker URL {url:?}: {reason}")]
    InvalidBrokerUrl { url: String, reason: String },
}
