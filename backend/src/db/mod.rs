//! Persistence of analysis records.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Analyzers / HTTP layer                                 │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │  fingerprint (ResourceId)
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  AnalysisRepository trait (repository/)                 │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴──────────────┐
//!     │                              │
//! ┌───▼──────────────┐   ┌───────────▼──────────┐
//! │ LocalRepository  │   │ PostgresRepository   │
//! │ (in-memory)      │   │ (Diesel, JSONB)      │
//! └──────────────────┘   └──────────────────────┘
//! ```
//!
//! - `fingerprint`: deterministic resource ids for normalized requests
//! - `repository`: trait definition and error types
//! - `repositories::local`: in-memory implementation for tests and development
//! - `repositories::postgres`: Postgres implementation (feature `postgres-repo`)
//! - `factory`: creating repositories from type, environment or config

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod fingerprint;
pub mod repositories;
pub mod repository;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use factory::{RepositoryBuilder, RepositoryFactory, RepositoryType};
pub use fingerprint::{calculate_checksum, fingerprint_value};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{AnalysisRepository, ErrorContext, RepositoryError, RepositoryResult};

use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};

use crate::config::AppConfig;

/// Global repository instance initialized once per process.
static REPOSITORY: OnceLock<Arc<dyn AnalysisRepository>> = OnceLock::new();

/// Initialize the global repository singleton from `config`.
///
/// Later calls return the repository created by the first one.
pub async fn init_repository(config: &AppConfig) -> Result<Arc<dyn AnalysisRepository>> {
    if let Some(repo) = REPOSITORY.get() {
        return Ok(repo.clone());
    }

    let repo = RepositoryFactory::from_config(config)
        .await
        .map_err(|e| anyhow::Error::msg(e.to_string()))
        .context("Failed to initialize analysis repository")?;
    Ok(REPOSITORY.get_or_init(|| repo).clone())
}

/// Get the global repository instance.
pub fn get_repository() -> Result<&'static Arc<dyn AnalysisRepository>> {
    REPOSITORY
        .get()
        .context("Repository not initialized. Call init_repository() first.")
}
