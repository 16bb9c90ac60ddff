//! MUSE API Server
//!
//! REST API server guarding tokenize/embed behind JWT sessions.
//!
//! Author: hephaex@gmail.com

use muse_api::auth::repository::{connect, migrate};
use muse_api::{create_router, spawn_revocation_pruner, state::AppState};
use muse_core::config::{AppConfig, LoggingConfig};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("muse_api={},tower_http=debug,audit=info", logging.level).into()
    });

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    init_tracing(&config.logging);
    tracing::debug!(config = ?config, "Configuration loaded");

    // Open and migrate the database
    let pool = connect(&config.database).await?;
    migrate(&pool).await?;

    // Inference collaborator
    let inferencer = muse_infer::create_inferencer(&config.inference)?;
    tracing::info!(
        backend = inferencer.name(),
        dimension = inferencer.dimension(),
        "Inference backend ready"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let prune_interval = config.auth.prune_interval_secs;

    // Create application state
    let state = Arc::new(AppState::new(config, pool, inferencer));

    if prune_interval > 0 {
        spawn_revocation_pruner(
            state.auth.clone(),
            state.clock.clone(),
            Duration::from_secs(prune_interval),
        );
        tracing::info!(interval_secs = prune_interval, "Revocation pruning enabled");
    }

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("MUSE API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
    }
}
