//! WeCom callback server.
//!
//! This binary:
//! - Loads the callback secrets and server settings from the environment
//! - Answers WeCom's URL verification and message callbacks
//! - Dispatches text and image messages to the configured command
//! - Terminates TLS itself when a certificate and key are configured

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wecom_callback::{router, AppState, Config, Dispatcher, MsgCrypt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the filter reads RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("callback_server_starting");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        callback_path = %config.callback_path,
        corp_id = %config.corp_id,
        handler_command = %config.handler_command,
        channel_id = config.channel_id,
        dispatch_workers = config.dispatch_workers,
        dispatch_queue_capacity = config.dispatch_queue_capacity,
        handler_timeout_secs = ?config.handler_timeout_secs,
        "config_loaded"
    );

    let crypt = MsgCrypt::new(config.secrets()).context("Invalid callback secrets")?;

    // Start the dispatcher workers
    let handler = config.command_handler()?;
    let (dispatcher, workers) = Dispatcher::start(handler, config.dispatcher_options());

    let state = AppState::new(crypt, dispatcher, config.channel_id);
    let app = router(state, &config.callback_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    match config.tls_paths() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .context("Failed to load TLS certificate or key")?;

            info!(
                address = %addr,
                cert = %cert.display(),
                key = %key.display(),
                "callback_server_listening_tls"
            );

            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
            });

            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("Server error")?;
        }
        None => {
            warn!("SSL certificate or key not found. Running in HTTP mode.");
            warn!("For production use, set SSL_CERT_PATH and SSL_KEY_PATH.");

            let listener = TcpListener::bind(addr)
                .await
                .context("Failed to bind to address")?;

            info!(address = %addr, "callback_server_listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;
        }
    }

    // The router owned the last dispatcher; let queued jobs finish
    workers.join().await;

    info!("callback_server_shutdown_complete");

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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("callback_server_shutting_down");
}
