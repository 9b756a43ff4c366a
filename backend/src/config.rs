//! Application configuration.
//!
//! Settings are read from `analytics.toml` and then overridden from the
//! environment. Every section is optional; missing values fall back to the
//! built-in defaults.
//!
//! ```toml
//! [repository]
//! type = "postgres"
//!
//! [postgres]
//! database_url = "postgres://localhost/analytics"
//!
//! [compute]
//! data_api_url = "https://data-api.example.org"
//! raster_api_url = "https://raster.example.org"
//! max_concurrent_requests = 4
//!
//! [[precalc]]
//! dataset = "umd_tree_cover_loss"
//! table = "admin_tree_cover_loss"
//! aoi_types = ["admin"]
//! fields = { loss_year = "umd_tree_cover_loss__year", area__ha = "umd_tree_cover_loss__ha" }
//!
//! [boundaries.admin]
//! table = "gadm_administrative_boundaries"
//! id_column = "gid"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::api::AoiType;
use crate::compute::backends::{
    default_boundaries, BoundaryTable, ClientCredentialsProvider, ScopedCredentials,
};
use crate::compute::sql::Ident;
use crate::compute::{default_precalc_tables, PrecalcTable};
use crate::db::factory::RepositoryType;
#[cfg(feature = "postgres-repo")]
use crate::db::PostgresConfig;

/// Name of the configuration file searched for by default.
pub const CONFIG_FILE_NAME: &str = "analytics.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub repository: RepositorySettings,
    pub postgres: PostgresSettings,
    pub compute: ComputeSettings,
    pub server: ServerSettings,
    /// Precomputed tables in priority order; `None` uses the built-in list.
    pub precalc: Option<Vec<PrecalcTable>>,
    /// Boundary tables by AOI type, merged over the built-in ones.
    pub boundaries: BTreeMap<String, BoundaryTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repository_type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repository_type(),
        }
    }
}

fn default_repository_type() -> String {
    "local".to_string()
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

/// Remote backends and OTF parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSettings {
    pub data_api_url: String,
    pub raster_api_url: String,
    pub api_key: Option<String>,
    /// When set, `api_key` is exchanged here for short-lived tokens.
    pub token_url: Option<String>,
    pub projection: String,
    /// Pixel size in meters.
    pub scale: f64,
    pub max_concurrent_requests: usize,
    pub request_timeout_secs: u64,
    pub token_refresh_margin_secs: u64,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            data_api_url: "http://localhost:9000".to_string(),
            raster_api_url: "http://localhost:9001".to_string(),
            api_key: None,
            token_url: None,
            projection: "EPSG:4326".to_string(),
            scale: 30.0,
            max_concurrent_requests: 8,
            request_timeout_secs: 60,
            token_refresh_margin_secs: 60,
        }
    }
}

impl ComputeSettings {
    /// Credentials shared by every backend client.
    pub fn credentials(&self, client: reqwest::Client) -> ScopedCredentials {
        match (&self.token_url, self.api_key.as_deref()) {
            (Some(token_url), Some(api_key)) if !api_key.is_empty() => ScopedCredentials::new(
                Arc::new(ClientCredentialsProvider::new(client, token_url, api_key)),
                chrono::Duration::seconds(self.token_refresh_margin_secs as i64),
            ),
            _ => ScopedCredentials::from_api_key(self.api_key.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first `analytics.toml` found in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    ///
    /// Returns `Ok(None)` when no file exists.
    pub fn from_default_location() -> Result<Option<Self>, ConfigError> {
        let search_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("backend").join(CONFIG_FILE_NAME),
            PathBuf::from("..").join(CONFIG_FILE_NAME),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// File (explicit or default location, else defaults) plus environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_location()?.unwrap_or_default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override settings from process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override settings from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(repo_type) = lookup("REPOSITORY_TYPE") {
            self.repository.repo_type = repo_type;
        }
        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("PG_DATABASE_URL")) {
            self.postgres.database_url = url;
        }
        if let Some(url) = lookup("DATA_API_URL") {
            self.compute.data_api_url = url;
        }
        if let Some(url) = lookup("RASTER_API_URL") {
            self.compute.raster_api_url = url;
        }
        if let Some(key) = lookup("ANALYTICS_API_KEY") {
            self.compute.api_key = Some(key);
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.repository_type()?;
        if self.compute.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "compute.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if !self.compute.scale.is_finite() || self.compute.scale <= 0.0 {
            return Err(ConfigError::Invalid(
                "compute.scale must be a positive finite number".to_string(),
            ));
        }
        for table in self.precalc.iter().flatten() {
            check_ident(&format!("precalc '{}' table", table.dataset), &table.table)?;
            for (field, column) in &table.fields {
                check_ident(&format!("precalc '{}' field '{}'", table.dataset, field), column)?;
            }
        }
        for (aoi_type, boundary) in self.boundary_tables()? {
            for column in [&boundary.table, &boundary.id_column, &boundary.geometry_column] {
                check_ident(&format!("boundaries.{}", aoi_type), column)?;
            }
        }
        Ok(())
    }

    pub fn repository_type(&self) -> Result<RepositoryType, ConfigError> {
        RepositoryType::from_str(&self.repository.repo_type).map_err(ConfigError::Invalid)
    }

    /// Configured precalc tables, or the built-in ones.
    pub fn precalc_tables(&self) -> Vec<PrecalcTable> {
        self.precalc.clone().unwrap_or_else(default_precalc_tables)
    }

    /// Built-in boundary tables with configured overrides applied.
    pub fn boundary_tables(&self) -> Result<BTreeMap<AoiType, BoundaryTable>, ConfigError> {
        let mut tables = default_boundaries();
        for (aoi_type, table) in &self.boundaries {
            let aoi_type = AoiType::from_str(aoi_type).map_err(ConfigError::Invalid)?;
            tables.insert(aoi_type, table.clone());
        }
        Ok(tables)
    }

    /// Postgres settings, if the configured repository is Postgres.
    #[cfg(feature = "postgres-repo")]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, ConfigError> {
        if self.repository_type()? != RepositoryType::Postgres {
            return Ok(None);
        }

        if self.postgres.database_url.is_empty() {
            return Err(ConfigError::Invalid(
                "Postgres repository requires 'postgres.database_url' setting".to_string(),
            ));
        }

        Ok(Some(PostgresConfig {
            database_url: self.postgres.database_url.clone(),
            max_pool_size: self.postgres.max_connections,
            min_pool_size: self.postgres.min_connections,
            connection_timeout_sec: self.postgres.connect_timeout,
            idle_timeout_sec: self.postgres.idle_timeout,
            max_retries: self.postgres.max_retries,
            retry_delay_ms: self.postgres.retry_delay_ms,
        }))
    }
}

/// Names interpolated into SQL must be plain identifiers.
fn check_ident(setting: &str, name: &str) -> Result<(), ConfigError> {
    Ident::new(name)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(format!("{}: {}", setting, e)))
}
