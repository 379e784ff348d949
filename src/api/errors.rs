use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::{StatsError, StoreError};

#[derive(Debug)]
pub enum AppError {
    /// The class has no readings.
    NoData,
    BadRequest(String),
    Unauthenticated,
    Forbidden,
    StoreUnavailable(String),
    Internal(anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NoData => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::NoData => "No data".to_owned(),
            AppError::BadRequest(msg) => msg,
            AppError::Unauthenticated => "Missing caller role".to_owned(),
            AppError::Forbidden => "Insufficient role".to_owned(),
            AppError::StoreUnavailable(msg) => {
                error!(error = %msg, "Store unavailable");
                "Store unavailable".to_owned()
            }
            AppError::Internal(e) => {
                error!(error = %e, "Internal error");
                e.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) => AppError::StoreUnavailable(e.to_string()),
            StoreError::Rejected(_) => AppError::BadRequest(e.to_string()),
            StoreError::Corrupt { .. } => AppError::Internal(e.into()),
        }
    }
}

impl From<StatsError> for AppError {
    fn from(e: StatsError) -> Self {
        match e {
            StatsError::NoData(_) => AppError::NoData,
            StatsError::Store(e) => e.into(),
        }
    }
}
