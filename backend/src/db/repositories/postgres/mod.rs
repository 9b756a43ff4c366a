//! Postgres repository implementation using Diesel.
//!
//! Analyses live in a single `analyses` table keyed by fingerprint, with the
//! normalized request and the result table stored as JSONB. A store is one
//! `INSERT ... ON CONFLICT DO UPDATE` statement, so the status and result of
//! a record always change together.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::str::FromStr;
use std::time::Duration;
use tokio::task;

use crate::api::{Analysis, AnalysisStatus, ResourceId, ResultTable};
use crate::db::repository::{
    AnalysisRepository, ErrorContext, RepositoryError, RepositoryResult,
};

mod models;
mod schema;

use models::{AnalysisRow, NewAnalysisRow};
use schema::analyses;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;
        let defaults = Self::default();

        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
                RepositoryError::internal_with_context(
                    format!("Migration failed: {}", e),
                    ErrorContext::new("run_migrations"),
                )
            })?;
        }

        Ok(Self { pool, config })
    }

    /// Execute a database operation with automatic retry for transient failures.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1)),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        return Err(e);
                    }
                }
            }

            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

fn to_row(resource_id: ResourceId, analysis: &Analysis) -> RepositoryResult<NewAnalysisRow> {
    let result = serde_json::to_value(&analysis.result).map_err(|e| {
        RepositoryError::serialization_with_context(
            e.to_string(),
            ErrorContext::new("store_analysis").with_entity_id(resource_id),
        )
    })?;
    Ok(NewAnalysisRow {
        resource_id: resource_id.to_string(),
        metadata: analysis.metadata.clone(),
        result,
        status: analysis.status.as_str().to_string(),
        updated_at: Utc::now(),
    })
}

fn from_row(row: AnalysisRow) -> RepositoryResult<Analysis> {
    let context = || ErrorContext::new("load_analysis").with_entity_id(&row.resource_id);
    let result: ResultTable = serde_json::from_value(row.result.clone())
        .map_err(|e| RepositoryError::serialization_with_context(e.to_string(), context()))?;
    let status = AnalysisStatus::from_str(&row.status)
        .map_err(|e| RepositoryError::serialization_with_context(e, context()))?;
    Ok(Analysis {
        metadata: row.metadata,
        result,
        status,
    })
}

#[async_trait]
impl AnalysisRepository for PostgresRepository {
    async fn store_analysis(
        &self,
        resource_id: ResourceId,
        analysis: &Analysis,
    ) -> RepositoryResult<()> {
        let row = to_row(resource_id, analysis)?;
        self.with_conn(move |conn| {
            diesel::insert_into(analyses::table)
                .values(&row)
                .on_conflict(analyses::resource_id)
                .do_update()
                .set(&row)
                .execute(conn)
                .map_err(|e| RepositoryError::from(e).with_operation("store_analysis"))?;
            Ok(())
        })
        .await
    }

    async fn load_analysis(&self, resource_id: ResourceId) -> RepositoryResult<Analysis> {
        let key = resource_id.to_string();
        let row = self
            .with_conn(move |conn| {
                analyses::table
                    .find(&key)
                    .select(AnalysisRow::as_select())
                    .first(conn)
                    .optional()
                    .map_err(|e| RepositoryError::from(e).with_operation("load_analysis"))
            })
            .await?;

        match row {
            Some(row) => from_row(row),
            None => Err(RepositoryError::not_found_with_context(
                "Analysis not found",
                ErrorContext::new("load_analysis")
                    .with_entity("analysis")
                    .with_entity_id(resource_id),
            )),
        }
    }

    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            diesel::sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(RepositoryError::from)
        })
        .await
    }
}
