//! ResendForward Web Server - receives Resend webhooks and forwards mail.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resendforward::retention::run_sweeper;
use resendforward::store::load_seed;
use resendforward::web::build_router;
use resendforward::{
    AppState, Config, Forwarder, MemoryStore, RecordStore, ResendClient, SecretVault,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        resend_api_base_url = %config.resend_api_base_url,
        request_timeout_ms = config.request_timeout_ms,
        webhook_tolerance_seconds = config.webhook_tolerance_seconds,
        seed_file = ?config.seed_file,
        pending_timeout_secs = config.pending_timeout_secs,
        event_retention_days = config.event_retention_days,
        "config_loaded"
    );

    let key = config
        .secrets_encryption_key
        .as_deref()
        .context("SECRETS_ENCRYPTION_KEY must be set")?;
    let vault = Arc::new(SecretVault::new(key).context("Invalid SECRETS_ENCRYPTION_KEY")?);

    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());

    if let Some(path) = &config.seed_file {
        load_seed(path, &vault, store.as_ref())
            .await
            .with_context(|| format!("Failed to load seed file {path}"))?;
    }

    let provider = ResendClient::new(
        &config.resend_api_base_url,
        Duration::from_millis(config.request_timeout_ms),
    )
    .context("Failed to create Resend client")?;

    if config.retention_sweep_interval_secs > 0 {
        tokio::spawn(run_sweeper(
            store.clone(),
            config.event_retention_days,
            Duration::from_secs(config.retention_sweep_interval_secs),
        ));
        info!(
            interval_secs = config.retention_sweep_interval_secs,
            "retention_sweeper_started"
        );
    }

    let forwarder = Forwarder::new(
        store,
        Arc::new(provider),
        vault,
        config.webhook_tolerance_seconds,
    )
    .with_pending_timeout(config.pending_timeout_secs);

    let app = build_router(AppState::new(forwarder));

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received_sigint"),
        _ = terminate => info!("received_sigterm"),
    }

    info!("web_server_shutting_down");
}
