// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_service::DashboardService;
use crate::infrastructure::api_repository::ApiRepository;
use crate::infrastructure::config::load_config;
use crate::presentation::app_state::AppState;
use crate::presentation::router::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_config()?;
    if config.api.base_url().is_none() {
        tracing::error!(
            "api.base_url is not set (config/dashboard.toml or TRAFFIC__API__BASE_URL); all fetches will fail"
        );
    }

    // Create repository (infrastructure layer)
    let repository = Arc::new(ApiRepository::new(
        config.api.base_url(),
        config.api.timeout(),
    )?);

    // Create services (application layer)
    let dashboard = DashboardService::new(repository, config.dashboard.clone());

    // Load the default range in the background so the first page is populated
    tokio::spawn({
        let dashboard = dashboard.clone();
        async move {
            dashboard.refresh().await;
        }
    });

    let state = Arc::new(AppState { dashboard });

    // Build router (presentation layer)
    let router = router(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting traffic-dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
