//! Land Analytics HTTP Server Binary
//!
//! Loads configuration, initializes the repository and compute engine, and
//! serves the analytics API.
//!
//! # Usage
//!
//! ```bash
//! # Local (in-memory) repository, defaults or ./analytics.toml
//! cargo run --bin analytics-server
//!
//! # Explicit config file with a Postgres repository
//! cargo run --bin analytics-server --features postgres-repo -- config/analytics.toml
//! ```
//!
//! # Environment Variables
//!
//! - `ANALYTICS_CONFIG`: Config file path, used when no argument is given
//! - `HOST` / `PORT`: Bind address (default: 0.0.0.0:8080)
//! - `REPOSITORY_TYPE`: `local` or `postgres`
//! - `DATABASE_URL`: PostgreSQL connection string
//! - `DATA_API_URL` / `RASTER_API_URL` / `ANALYTICS_API_KEY`: Compute backends
//! - `RUST_LOG`: Log filter (default: info)

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use land_analytics::analyzers::AnalyzerRegistry;
use land_analytics::compute::ComputeEngine;
use land_analytics::config::AppConfig;
use land_analytics::db;
use land_analytics::http::{create_router, AppState};
use land_analytics::services::JobTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Also captures `log` records from the library.
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Land Analytics HTTP Server");

    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("ANALYTICS_CONFIG").ok())
        .map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    info!(
        "Configuration loaded (repository: {}, precalc tables: {})",
        config.repository.repo_type,
        config.precalc_tables().len()
    );

    let repository = db::init_repository(&config).await?;
    info!("Repository initialized successfully");

    let engine = Arc::new(ComputeEngine::from_config(&config)?);
    let registry = AnalyzerRegistry::with_defaults(engine, repository.clone(), JobTracker::new());

    let state = AppState::new(repository, registry);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
