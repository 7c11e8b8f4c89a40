//! chromabase-server - REST API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use chromabase_core::ServiceConfig;
use chromabase_server::{create_server, AppState};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into())
        .add_directive("chromabase_server=debug".parse()?);

    let json = std::env::var("CHROMABASE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = ServiceConfig::load().context("failed to load configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;

    let state = AppState::from_config(config).context("failed to initialize service")?;
    info!(
        store = state.gateway.backend(),
        collections = ?state.gateway.catalog().names().collect::<Vec<_>>(),
        conventional_status_codes = state.config.conventional_status_codes,
        "Service configured"
    );

    let app = create_server(state.clone());
    info!("Starting chromabase-server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown. Live streams never end on their own, so
    // they are closed before axum waits for open connections.
    let live = state.hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received, closing live streams...");
            live.broadcaster().close_all();
        })
        .await?;

    state.shutdown().await;
    info!("Server stopped cleanly");
    Ok(())
}
