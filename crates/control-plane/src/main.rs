// Campuslog admin API server
// Decision: The server owns one EventLogService; shutdown flushes files and drains enrichment

use std::sync::Arc;

use anyhow::{Context, Result};
use campuslog_control_plane::{build_router, storage, RouterConfig};
use campuslog_durable::{EventLogService, PipelineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn init_tracing() {
    // RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("campuslog=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(filter),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("campuslog-control-plane starting...");

    let database_url = std::env::var("DATABASE_URL").ok();
    let store = storage::open_store(database_url.as_deref()).await?;

    let pipeline_config = PipelineConfig::from_env();
    tracing::info!(
        log_dir = %pipeline_config.log_dir.display(),
        retention_days = pipeline_config.retention_days,
        "Pipeline configured"
    );
    let service = Arc::new(
        EventLogService::start(pipeline_config, store)
            .await
            .context("Failed to start event log service")?,
    );

    let router_config = RouterConfig::from_env();
    if !router_config.api_prefix.is_empty() {
        tracing::info!(prefix = %router_config.api_prefix, "API prefix configured");
    }
    if router_config.cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?router_config.cors_origins, "CORS origins configured");
    }
    let app = build_router(Arc::clone(&service), &router_config);

    let addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    service
        .shutdown()
        .await
        .context("Failed to shut down event log service")?;
    Ok(())
}
