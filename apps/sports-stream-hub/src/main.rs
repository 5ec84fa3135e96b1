//! Sports Stream Hub Binary
//!
//! Starts the live sports notification hub.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sports-stream-hub
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `SPORTS_HUB_WS_PORT`: client WebSocket port (default: 8080)
//! - `SPORTS_HUB_HEALTH_PORT`: health/stats/metrics HTTP port (default: 8082)
//! - `SPORTS_HUB_OUTBOUND_QUEUE_CAPACITY`: frames buffered per client (default: 256)
//! - `SPORTS_HUB_EVENT_SOURCE`: synthetic | upstream | none (default: synthetic)
//! - `SPORTS_HUB_UPSTREAM_URL`: upstream feed URL (required for upstream)
//! - `SPORTS_HUB_SYNTHETIC_INTERVAL_SECS`: synthetic tick period (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: sports-stream-hub)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sports_stream_hub::infrastructure::feed::{FeedState, build_event_source, spawn_event_source};
use sports_stream_hub::infrastructure::health::{HealthServer, HealthServerState};
use sports_stream_hub::infrastructure::telemetry;
use sports_stream_hub::infrastructure::websocket::{SessionContext, WsServer};
use sports_stream_hub::{Broadcaster, Hub, HubConfig, init_metrics};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long to wait for the event source to stop after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Sports Stream Hub");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = HubConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Core services
    let hub = Arc::new(Hub::new());
    let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&hub)));

    // Event source
    let feed_state = Arc::new(FeedState::new(config.event_source.as_str()));
    let source_task = build_event_source(&config, Arc::clone(&feed_state))?
        .map(|source| spawn_event_source(source, broadcaster.clone(), shutdown_token.clone()));

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&hub),
        Arc::clone(&feed_state),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn client WebSocket server
    let session_context = Arc::new(SessionContext::new(
        Arc::clone(&broadcaster),
        config.welcome.clone(),
        config.server.outbound_queue_capacity,
    ));
    let ws_server = WsServer::new(
        config.server.ws_port,
        session_context,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = ws_server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    tracing::info!("Sports hub ready");

    await_shutdown(shutdown_token).await;

    let closed = hub.shutdown();
    tracing::info!(closed, "Closed client connections");

    if let Some(task) = source_task {
        wait_for_source(task).await;
    }

    tracing::info!("Sports hub stopped");
    Ok(())
}

async fn wait_for_source(task: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Event source task panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Event source did not stop in time"
        ),
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        event_source = config.event_source.as_str(),
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        outbound_queue_capacity = config.server.outbound_queue_capacity,
        "Configuration loaded"
    );
    tracing::debug!(
        synthetic_interval_secs = config.synthetic.interval.as_secs(),
        synthetic_games = ?config.synthetic.games,
        upstream_url = ?config.feed.upstream_url,
        "Event source settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
