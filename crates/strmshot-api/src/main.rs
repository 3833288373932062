//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strmshot_api::{create_router, metrics, ApiConfig, AppState};
use strmshot_media::{check_ffmpeg, check_ffprobe};
use strmshot_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Required by rustls 0.23+ before any TLS client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    init_tracing()?;

    info!("Starting strmshot-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        media_root = ?config.media_root,
        auth = config.api_token.is_some(),
        "API config loaded"
    );

    if let Err(e) = check_ffmpeg() {
        warn!(error = %e, "ffmpeg not found; thumbnail jobs will fail");
    }
    if let Err(e) = check_ffprobe() {
        warn!(error = %e, "ffprobe not found; duration probes will fail");
    }

    let state = AppState::new(config.clone(), worker_config)
        .await
        .context("failed to create application state")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let (stop_autosave, autosave_rx) = watch::channel(false);
    let autosave = state.cache.clone().spawn_autosave(
        state.worker.cache_save_interval,
        state.worker.cache_max_age,
        autosave_rx,
    );

    let app = create_router(state.clone(), metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = stop_autosave.send(true);
    let _ = autosave.await;

    info!(status = ?state.queue.status(), "Waiting for in-flight jobs");
    if tokio::time::timeout(config.shutdown_timeout, state.queue.drain())
        .await
        .is_err()
    {
        let discarded = state.queue.clear();
        warn!(
            discarded,
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Shutdown timeout reached with jobs still running"
        );
    }

    match state.cache.save().await {
        Ok(true) => info!(entries = state.cache.len(), "Duration cache saved"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Failed to save duration cache"),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("strmshot=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
