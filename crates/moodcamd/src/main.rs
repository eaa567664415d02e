use anyhow::{Context, Result};
use moodcam_core::{OnnxEmotionDetector, PersistenceGate};
use moodcam_store::HistoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;
mod store_slot;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "moodcamd starting");

    let config = config::Config::load().context("failed to load configuration")?;
    let scale = config.mode.scale_factor();
    tracing::info!(
        mode = %config.mode,
        scale = scale.get(),
        listen = %config.listen_addr,
        db = %config.db_path.display(),
        "configuration loaded"
    );

    // Models load before the listener binds; a missing model aborts startup.
    let detector = OnnxEmotionDetector::load(&config.model_dir, config.mode)
        .context("failed to load emotion detector")?;
    let engine = engine::spawn_engine(Box::new(detector), scale, config.queue_depth);

    let store = match HistoryStore::open(&config.db_path).await {
        Ok(store) => store_slot::StoreSlot::ready(store),
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config.db_path.display(),
                "history store unavailable; will retry on next use"
            );
            store_slot::StoreSlot::deferred(config.db_path.clone())
        }
    };

    let state = Arc::new(http::AppState {
        engine,
        store,
        gate: PersistenceGate::new(config.persist_threshold),
        mode: config.mode,
        scale,
    });
    let app = http::router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "moodcamd ready");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("moodcamd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
