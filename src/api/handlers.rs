use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;
use utoipa::OpenApi;

use super::{
    auth::{Caller, ADMINS, VIEWERS},
    dto::{
        ClassCountDto, ClassStatsDto, ClearResultDto, HistoryPointDto, IngestResponseDto,
        RejectedFieldDto, SensorPayloadDto, SensorStatusDto, SensorSummaryDto,
    },
    errors::AppError,
    extract::QueryParams,
    AppState,
};
use crate::{
    db::models::{ReadingValue, SensorClass},
    ingest::{FailureReason, Outcome},
};

/// Longest window a query may ask for (ten years).
const MAX_WINDOW_HOURS: u32 = 24 * 366 * 10;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub threshold_secs: Option<u64>,
}

fn parse_class(raw: &str) -> Result<SensorClass, AppError> {
    raw.parse()
        .map_err(|e: anyhow::Error| AppError::BadRequest(e.to_string()))
}

fn resolve_window(params: &WindowParams, state: &AppState) -> Result<Duration, AppError> {
    match params.hours {
        None => Ok(state.settings.default_window),
        Some(h) if h <= MAX_WINDOW_HOURS => Ok(Duration::hours(i64::from(h))),
        Some(h) => Err(AppError::BadRequest(format!(
            "hours must be at most {MAX_WINDOW_HOURS}, got {h}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Latest reading of a sensor class with min/max over the trailing window.
/// Rain additionally reports `total_today`.
#[utoipa::path(
    get,
    path = "/sensors/{class}/latest",
    params(
        ("class" = SensorClass, Path, description = "Sensor class"),
        ("hours" = Option<u32>, Query, description = "Window length in hours (default 24)"),
        ("x-caller-role" = String, Header, description = "`user` or `admin`"),
    ),
    responses(
        (
            status = 200,
            description = "Latest reading with window aggregates",
            body = SensorSummaryDto
        ),
        (status = 400, description = "Unknown sensor class"),
        (status = 401, description = "Missing caller role"),
        (status = 403, description = "Insufficient role"),
        (status = 404, description = "No data"),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_latest(
    State(state): State<AppState>,
    caller: Caller,
    Path(class): Path<String>,
    QueryParams(params): QueryParams<WindowParams>,
) -> Result<Json<SensorSummaryDto>, AppError> {
    caller.require(VIEWERS)?;
    let class = parse_class(&class)?;
    let window = resolve_window(&params, &state)?;

    let summary = state.aggregator.summarize(class, window, Utc::now()).await?;
    Ok(Json(summary.into()))
}

/// Readings in the trailing window, ascending by timestamp, at most 100.
#[utoipa::path(
    get,
    path = "/sensors/{class}/history",
    params(
        ("class" = SensorClass, Path, description = "Sensor class"),
        ("hours" = Option<u32>, Query, description = "Window length in hours (default 24)"),
        ("x-caller-role" = String, Header, description = "`user` or `admin`"),
    ),
    responses(
        (status = 200, description = "Readings in the window", body = Vec<HistoryPointDto>),
        (status = 400, description = "Unknown sensor class"),
        (status = 401, description = "Missing caller role"),
        (status = 403, description = "Insufficient role"),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_history(
    State(state): State<AppState>,
    caller: Caller,
    Path(class): Path<String>,
    QueryParams(params): QueryParams<WindowParams>,
) -> Result<Json<Vec<HistoryPointDto>>, AppError> {
    caller.require(VIEWERS)?;
    let class = parse_class(&class)?;
    let window = resolve_window(&params, &state)?;

    let readings = state.aggregator.history(class, window, Utc::now()).await?;
    Ok(Json(readings.into_iter().map(Into::into).collect()))
}

/// Active/stale status of every sensor class.
#[utoipa::path(
    get,
    path = "/sensors/status",
    params(
        (
            "threshold_secs" = Option<u64>,
            Query,
            description = "Activity threshold in seconds (default 300)"
        ),
        ("x-caller-role" = String, Header, description = "`user` or `admin`"),
    ),
    responses(
        (status = 200, description = "Status per sensor class", body = Vec<SensorStatusDto>),
        (status = 401, description = "Missing caller role"),
        (status = 403, description = "Insufficient role"),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_status(
    State(state): State<AppState>,
    caller: Caller,
    QueryParams(params): QueryParams<StatusParams>,
) -> Result<Json<Vec<SensorStatusDto>>, AppError> {
    caller.require(VIEWERS)?;
    let threshold = match params.threshold_secs {
        None => state.settings.active_threshold,
        Some(secs) => i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| AppError::BadRequest(format!("threshold_secs out of range: {secs}")))?,
    };

    let statuses = state.aggregator.status(Utc::now(), threshold).await?;
    Ok(Json(statuses.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

/// Number of stored readings of a class.
#[utoipa::path(
    get,
    path = "/admin/sensors/{class}/count",
    params(
        ("class" = SensorClass, Path, description = "Sensor class"),
        ("x-caller-role" = String, Header, description = "`admin`"),
    ),
    responses(
        (status = 200, description = "Reading count", body = ClassCountDto),
        (status = 400, description = "Unknown sensor class"),
        (status = 401, description = "Missing caller role"),
        (status = 403, description = "Insufficient role"),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "admin"
)]
pub async fn get_class_count(
    State(state): State<AppState>,
    caller: Caller,
    Path(class): Path<String>,
) -> Result<Json<ClassCountDto>, AppError> {
    caller.require(ADMINS)?;
    let class = parse_class(&class)?;

    let count = state.store.count(class).await?;
    Ok(Json(ClassCountDto {
        sensor_class: class,
        count,
    }))
}

/// Delete every reading of a class.
#[utoipa::path(
    delete,
    path = "/admin/sensors/{class}",
    params(
        ("class" = SensorClass, Path, description = "Sensor class"),
        ("x-caller-role" = String, Header, description = "`admin`"),
    ),
    responses(
        (status = 200, description = "Partition cleared", body = ClearResultDto),
        (status = 400, description = "Unknown sensor class"),
        (status = 401, description = "Missing caller role"),
        (status = 403, description = "Insufficient role"),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "admin"
)]
pub async fn clear_class(
    State(state): State<AppState>,
    caller: Caller,
    Path(class): Path<String>,
) -> Result<Json<ClearResultDto>, AppError> {
    caller.require(ADMINS)?;
    let class = parse_class(&class)?;

    let deleted = state.store.clear(class).await?;
    info!(class = %class, deleted, "Partition cleared");
    Ok(Json(ClearResultDto {
        sensor_class: class,
        deleted,
    }))
}

/// Count and latest reading of every class.
#[utoipa::path(
    get,
    path = "/admin/sensors/stats",
    params(
        ("x-caller-role" = String, Header, description = "`admin`"),
    ),
    responses(
        (status = 200, description = "Per-class statistics", body = Vec<ClassStatsDto>),
        (status = 401, description = "Missing caller role"),
        (status = 403, description = "Insufficient role"),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "admin"
)]
pub async fn get_admin_stats(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ClassStatsDto>>, AppError> {
    caller.require(ADMINS)?;

    let mut out = Vec::with_capacity(SensorClass::ALL.len());
    for class in SensorClass::ALL {
        out.push(ClassStatsDto {
            sensor_class: class,
            count: state.store.count(class).await?,
            latest: state.store.latest(class).await?.map(Into::into),
        });
    }
    Ok(Json(out))
}

// ---------------------------------------------------------------------------
// Push ingestion
// ---------------------------------------------------------------------------

/// Ingest one device payload over HTTP. Goes through the same pipeline as
/// broker messages.
#[utoipa::path(
    post,
    path = "/data/api/sensor-data",
    request_body = SensorPayloadDto,
    responses(
        (status = 200, description = "At least one reading stored", body = IngestResponseDto),
        (status = 400, description = "Undecodable or malformed payload, or no usable field"),
        (status = 503, description = "No reading could be stored"),
    ),
    tag = "ingest"
)]
pub async fn push_sensor_data(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponseDto>), AppError> {
    match state.pipeline.handle_payload(&body).await {
        Outcome::Acknowledged {
            persisted,
            rejected,
            ..
        } => Ok((
            StatusCode::OK,
            Json(IngestResponseDto {
                status: "success".to_owned(),
                persisted,
                rejected: rejected.into_iter().map(RejectedFieldDto::from).collect(),
            }),
        )),
        Outcome::Failed(FailureReason::Decode(e)) => {
            Err(AppError::BadRequest(format!("invalid JSON: {e}")))
        }
        Outcome::Failed(FailureReason::Malformed(e)) => Err(AppError::BadRequest(e.to_string())),
        Outcome::Failed(FailureReason::NoReadings { rejected }) => {
            let reasons: Vec<String> = rejected.iter().map(ToString::to_string).collect();
            Err(AppError::BadRequest(format!(
                "no usable field in payload: {}",
                reasons.join("; ")
            )))
        }
        Outcome::Failed(FailureReason::StoreUnavailable { attempted }) => Err(
            AppError::StoreUnavailable(format!("none of {attempted} readings could be stored")),
        ),
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_sensor_latest,
        get_sensor_history,
        get_sensor_status,
        get_class_count,
        clear_class,
        get_admin_stats,
        push_sensor_data,
        health
    ),
    components(schemas(
        SensorSummaryDto,
        HistoryPointDto,
        SensorStatusDto,
        ClassCountDto,
        ClearResultDto,
        ClassStatsDto,
        IngestResponseDto,
        RejectedFieldDto,
        SensorPayloadDto,
        SensorClass,
        ReadingValue
    )),
    tags(
        (name = "sensors", description = "Dashboard queries"),
        (name = "admin",   description = "Partition maintenance"),
        (name = "ingest",  description = "Device payload intake"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Sensor Hub API",
        version = "0.1.0",
        description = "Ingestion and query service for environmental sensor readings"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{HeaderName, HeaderValue};
    use axum_test::TestServer;
    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        api::{router, QuerySettings},
        db::models::Reading,
        ingest::{IngestionPipeline, Normalizer, PayloadProfile},
        stats::{DayBoundary, WindowedAggregator},
        store::{MemoryReadingStore, ReadingStore},
    };

    const ROLE: HeaderName = HeaderName::from_static("x-caller-role");

    fn test_server(store: &MemoryReadingStore) -> TestServer {
        let store: crate::store::StorePtr = Arc::new(store.clone());
        let state = AppState {
            aggregator: WindowedAggregator::new(store.clone(), DayBoundary::Utc),
            pipeline: IngestionPipeline::new(
                store.clone(),
                Normalizer::new(PayloadProfile::MultiMetric),
            ),
            store,
            settings: QuerySettings::default(),
        };
        TestServer::new(router(state)).unwrap()
    }

    fn user() -> HeaderValue {
        HeaderValue::from_static("user")
    }

    fn admin() -> HeaderValue {
        HeaderValue::from_static("admin")
    }

    async fn insert(
        store: &MemoryReadingStore,
        class: SensorClass,
        value: impl Into<ReadingValue>,
        ts: DateTime<Utc>,
    ) {
        store
            .append(&Reading::new(class, class.default_title(), value, ts))
            .await
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // GET /sensors/{class}/latest
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn latest_empty_class_is_404() {
        let store = MemoryReadingStore::new();
        let server = test_server(&store);

        let resp = server
            .get("/sensors/temperature/latest")
            .add_header(ROLE, user())
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
        let body: Value = resp.json();
        assert_eq!(body, json!({ "error": "No data" }));
    }

    #[tokio::test]
    async fn latest_returns_value_and_window_bounds() {
        let store = MemoryReadingStore::new();
        let now = Utc::now();
        insert(&store, SensorClass::Temperature, 30.0, now - Duration::hours(30)).await;
        insert(&store, SensorClass::Temperature, 18.5, now - Duration::hours(2)).await;
        insert(&store, SensorClass::Temperature, 22.0, now - Duration::minutes(1)).await;

        let server = test_server(&store);
        let resp = server
            .get("/sensors/temperature/latest")
            .add_header(ROLE, user())
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["value"], 22.0);
        assert_eq!(body["title"], "Temperature Sensor");
        assert_eq!(body["min"], 18.5);
        assert_eq!(body["max"], 22.0);
        assert!(body.get("total_today").is_none());
    }

    #[tokio::test]
    async fn latest_with_empty_window_falls_back_to_value() {
        let store = MemoryReadingStore::new();
        insert(&store, SensorClass::Humidity, 55.0, Utc::now() - Duration::hours(5)).await;

        let server = test_server(&store);
        let resp = server
            .get("/sensors/humidity/latest")
            .add_query_param("hours", 1)
            .add_header(ROLE, user())
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["min"], 55.0);
        assert_eq!(body["max"], 55.0);
    }

    #[tokio::test]
    async fn rain_latest_includes_total_today() {
        let store = MemoryReadingStore::new();
        let now = Utc::now();
        insert(&store, SensorClass::Rain, 9.0, now - Duration::days(3)).await;
        insert(&store, SensorClass::Rain, 1.5, now).await;
        insert(&store, SensorClass::Rain, 2.0, now).await;

        let server = test_server(&store);
        let resp = server
            .get("/sensors/rain/latest")
            .add_header(ROLE, admin())
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["total_today"], 3.5);
    }

    #[tokio::test]
    async fn boolean_sensor_value_is_a_json_bool() {
        let store = MemoryReadingStore::new();
        insert(&store, SensorClass::Smoke, true, Utc::now()).await;

        let server = test_server(&store);
        let resp = server
            .get("/sensors/smoke/latest")
            .add_header(ROLE, user())
            .await;
        let body: Value = resp.json();
        assert_eq!(body["value"], true);
        assert_eq!(body["max"], 1.0);
    }

    #[tokio::test]
    async fn unknown_class_is_400() {
        let server = test_server(&MemoryReadingStore::new());
        let resp = server
            .get("/sensors/pressure/latest")
            .add_header(ROLE, user())
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_query_params_get_json_errors() {
        let server = test_server(&MemoryReadingStore::new());

        for path in [
            "/sensors/temperature/history?hours=abc",
            "/sensors/temperature/latest?hours=-1",
            "/sensors/status?threshold_secs=x",
        ] {
            let resp = server.get(path).add_header(ROLE, user()).await;
            resp.assert_status(StatusCode::BAD_REQUEST);
            let body: Value = resp.json();
            assert!(body["error"].is_string(), "{path}: {body}");
        }
    }

    // -----------------------------------------------------------------------
    // GET /sensors/{class}/history
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn history_is_ascending_and_capped() {
        let store = MemoryReadingStore::new();
        let now = Utc::now();
        for i in 0..150 {
            insert(
                &store,
                SensorClass::Temperature,
                i as f64,
                now - Duration::minutes(150 - i),
            )
            .await;
        }

        let server = test_server(&store);
        let resp = server
            .get("/sensors/temperature/history")
            .add_header(ROLE, user())
            .await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 100);
        assert!(body
            .windows(2)
            .all(|w| w[0]["timestamp"].as_str() <= w[1]["timestamp"].as_str()));
    }

    #[tokio::test]
    async fn history_of_empty_class_is_empty_array() {
        let server = test_server(&MemoryReadingStore::new());
        let resp = server
            .get("/sensors/light/history")
            .add_header(ROLE, user())
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body, json!([]));
    }

    // -----------------------------------------------------------------------
    // GET /sensors/status
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn status_reports_every_class() {
        let store = MemoryReadingStore::new();
        let now = Utc::now();
        insert(&store, SensorClass::Temperature, 20.0, now).await;
        insert(&store, SensorClass::Light, false, now - Duration::hours(1)).await;

        let server = test_server(&store);
        let resp = server
            .get("/sensors/status")
            .add_header(ROLE, user())
            .await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 5);
        let get = |class: &str| body.iter().find(|s| s["sensor_class"] == class).unwrap();
        assert_eq!(get("temperature")["active"], true);
        assert_eq!(get("light")["active"], false);
        assert_eq!(get("rain")["active"], false);
        assert!(get("rain")["last_seen"].is_null());
    }

    // -----------------------------------------------------------------------
    // Role guard
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn missing_role_is_401() {
        let server = test_server(&MemoryReadingStore::new());
        let resp = server.get("/sensors/rain/latest").await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = resp.json();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn user_cannot_reach_admin_routes() {
        let server = test_server(&MemoryReadingStore::new());
        let resp = server
            .get("/admin/sensors/rain/count")
            .add_header(ROLE, user())
            .await;
        resp.assert_status(StatusCode::FORBIDDEN);

        let resp = server
            .delete("/admin/sensors/rain")
            .add_header(ROLE, user())
            .await;
        resp.assert_status(StatusCode::FORBIDDEN);
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn clear_removes_partition() {
        let store = MemoryReadingStore::new();
        let now = Utc::now();
        for i in 0..10i64 {
            insert(&store, SensorClass::Rain, i as f64, now - Duration::minutes(i)).await;
        }
        insert(&store, SensorClass::Smoke, false, now).await;

        let server = test_server(&store);
        let resp = server
            .get("/admin/sensors/rain/count")
            .add_header(ROLE, admin())
            .await;
        let body: Value = resp.json();
        assert_eq!(body["count"], 10);

        let resp = server
            .delete("/admin/sensors/rain")
            .add_header(ROLE, admin())
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["deleted"], 10);

        let resp = server
            .get("/sensors/rain/latest")
            .add_header(ROLE, admin())
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(store.count(SensorClass::Smoke).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn admin_stats_lists_count_and_latest() {
        let store = MemoryReadingStore::new();
        insert(&store, SensorClass::Humidity, 40.0, Utc::now() - Duration::minutes(2)).await;
        insert(&store, SensorClass::Humidity, 45.0, Utc::now()).await;

        let server = test_server(&store);
        let resp = server
            .get("/admin/sensors/stats")
            .add_header(ROLE, admin())
            .await;
        resp.assert_status_ok();

        let body: Vec<Value> = resp.json();
        let humidity = body.iter().find(|s| s["sensor_class"] == "humidity").unwrap();
        assert_eq!(humidity["count"], 2);
        assert_eq!(humidity["latest"]["value"], 45.0);
        let rain = body.iter().find(|s| s["sensor_class"] == "rain").unwrap();
        assert_eq!(rain["count"], 0);
        assert!(rain["latest"].is_null());
    }

    // -----------------------------------------------------------------------
    // POST /data/api/sensor-data
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn push_ingests_full_payload() {
        let store = MemoryReadingStore::new();
        let server = test_server(&store);

        let resp = server
            .post("/data/api/sensor-data")
            .json(&json!({
                "timestamp": 1700000000,
                "temperature": 25.5,
                "humidity": 60,
                "is_dark": true,
                "is_raining": false,
                "is_smoke": false
            }))
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["persisted"], 5);
        assert_eq!(body["rejected"], json!([]));

        let light = store.latest(SensorClass::Light).await.unwrap().unwrap();
        assert_eq!(light.value, ReadingValue::Flag(true));
        assert_eq!(light.timestamp.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }

    #[tokio::test]
    async fn push_reports_rejected_fields() {
        let store = MemoryReadingStore::new();
        let server = test_server(&store);

        let resp = server
            .post("/data/api/sensor-data")
            .json(&json!({ "temperature": "warm", "humidity": 41 }))
            .await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["rejected"][0]["field"], "temperature");
        assert_eq!(store.count(SensorClass::Temperature).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn push_rejects_invalid_bodies() {
        let store = MemoryReadingStore::new();
        let server = test_server(&store);

        let resp = server.post("/data/api/sensor-data").text("{not json").await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let resp = server.post("/data/api/sensor-data").json(&json!([1, 2])).await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let resp = server
            .post("/data/api/sensor-data")
            .json(&json!({ "timestamp": "yesterday", "temperature": 20 }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        // Parses, but lies far outside what a timestamp column can hold.
        let resp = server
            .post("/data/api/sensor-data")
            .json(&json!({ "timestamp": -3e11, "temperature": 20 }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = resp.json();
        assert!(body["error"].as_str().unwrap().contains("timestamp"));

        for class in SensorClass::ALL {
            assert_eq!(store.count(class).await.unwrap(), 0);
        }
    }

    // -----------------------------------------------------------------------
    // System
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_returns_ok() {
        let server = test_server(&MemoryReadingStore::new());
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn openapi_spec_is_served() {
        let server = test_server(&MemoryReadingStore::new());
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Sensor Hub API");
        assert!(body["paths"]["/sensors/{class}/latest"].is_object());
    }
}
