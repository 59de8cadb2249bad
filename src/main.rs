use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tienda::config::Config;
use tienda::gateway::GatewayServer;
use tienda::AppState;

#[derive(Parser, Debug)]
#[command(name = "tienda")]
#[command(author, version, about = "Shop backend: cart service, auth, and API gateway", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tienda.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tienda v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = tienda::db::init(&config.server.data_dir).await?;

    // Ensure the seeded admin account exists
    tienda::api::auth::ensure_admin_user(
        &db,
        &config.auth.admin_email,
        config.auth.admin_password.as_deref(),
    )
    .await?;

    // Sweep expired and consumed one-shot tokens left over from before
    let swept = tienda::api::auth::delete_expired_tokens(&db).await?;
    if swept > 0 {
        tracing::info!(swept, "Removed stale password-reset tokens");
    }

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), db.clone()));

    // Start the gateway
    let gateway_addr: SocketAddr =
        format!("{}:{}", config.server.host, config.server.gateway_port).parse()?;
    let gateway = GatewayServer::new(&config.gateway, state.tokens.clone(), gateway_addr);
    tokio::spawn(async move {
        if let Err(e) = gateway.run().await {
            tracing::error!(error = %e, "Gateway server error");
        }
    });

    // Create API router
    let app = tienda::api::create_router(state);

    // Start API server
    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;

    tracing::info!("API server listening on http://{}", api_addr);
    tracing::info!("Gateway listening on http://{}", gateway_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
