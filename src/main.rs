use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sensor_hub_service::{
    api::{self, AppState, QuerySettings},
    config::{Config, StoreBackend},
    db,
    ingest::{IngestionPipeline, Normalizer},
    stats::WindowedAggregator,
    store::{MemoryReadingStore, PgReadingStore, StorePtr},
    transport::MqttSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    // Connect to the store; Postgres runs migrations first
    let (store, pool) = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            info!("Database ready");
            let store: StorePtr = Arc::new(PgReadingStore::new(pool.clone()));
            (store, Some(pool))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; readings are lost on exit");
            let store: StorePtr = Arc::new(MemoryReadingStore::new());
            (store, None)
        }
    };

    let pipeline = IngestionPipeline::new(store.clone(), Normalizer::new(config.ingest_profile));
    let aggregator = WindowedAggregator::new(store.clone(), config.day_boundary);

    // Spawn the MQTT consumer; it stops when `stop_tx` fires
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let consumer = match &config.mqtt {
        Some(mqtt) => {
            let source = MqttSource::connect(mqtt)
                .await
                .context("failed to set up MQTT source")?;
            let pipeline = pipeline.clone();
            let max_in_flight = config.max_in_flight;
            Some(tokio::spawn(async move {
                let stop = async move {
                    let _ = stop_rx.changed().await;
                };
                if let Err(e) = pipeline.run(source, max_in_flight, stop).await {
                    error!(error = %e, "Ingestion loop failed");
                }
            }))
        }
        None => {
            info!("MQTT_BROKER_URL not set; only HTTP push ingestion is available");
            None
        }
    };

    let settings = QuerySettings {
        default_window: Duration::hours(i64::from(config.window_hours)),
        active_threshold: i64::try_from(config.active_threshold_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .context("ACTIVE_THRESHOLD_SECS is out of range")?,
    };
    let state = AppState {
        store,
        aggregator,
        pipeline,
        settings,
    };

    // Start HTTP server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    let served = axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop pulling messages, let in-flight ones finish, then release the pool
    let _ = stop_tx.send(true);
    if let Some(handle) = consumer {
        if let Err(e) = handle.await {
            error!(error = %e, "Ingestion task panicked");
        }
    }
    if let Some(pool) = pool {
        pool.close().await;
        info!("Database pool closed");
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
