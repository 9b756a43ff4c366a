//! Analysis repository trait.
//!
//! Records are addressed by fingerprint. A store replaces the whole record
//! so readers never observe a status without its matching result.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{Analysis, ResourceId};

/// Repository trait for analysis records.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Upsert an analysis under its fingerprint.
    ///
    /// Overwriting an existing record is how a job moves from `pending` to
    /// `complete` or `failed`.
    ///
    /// # Arguments
    /// * `resource_id` - Fingerprint of the normalized request
    /// * `analysis` - Full record to store
    async fn store_analysis(
        &self,
        resource_id: ResourceId,
        analysis: &Analysis,
    ) -> RepositoryResult<()>;

    /// Load the analysis stored under `resource_id`.
    ///
    /// # Returns
    /// * `Ok(Analysis)` - The stored record
    /// * `Err(RepositoryError::NotFound)` - If the fingerprint is unknown
    async fn load_analysis(&self, resource_id: ResourceId) -> RepositoryResult<Analysis>;

    /// Check that the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;
}
