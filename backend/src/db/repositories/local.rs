//! In-memory local repository implementation.
//!
//! Suitable for unit testing and local development. Records are kept in a
//! `HashMap` behind a lock; each store swaps the full record under the write
//! lock, so a concurrent load sees either the old or the new record.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{Analysis, ResourceId};
use crate::db::repository::{
    AnalysisRepository, ErrorContext, RepositoryError, RepositoryResult,
};

/// In-memory local repository.
///
/// # Example
/// ```
/// use land_analytics::db::repositories::LocalRepository;
///
/// let repo = LocalRepository::new();
/// assert_eq!(repo.analysis_count(), 0);
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    analyses: HashMap<ResourceId, Analysis>,
    store_count: usize,
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            analyses: HashMap::new(),
            store_count: 0,
            is_healthy: true,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    /// Number of distinct analyses stored.
    pub fn analysis_count(&self) -> usize {
        self.data.read().analyses.len()
    }

    /// Total number of store calls served, overwrites included.
    pub fn store_count(&self) -> usize {
        self.data.read().store_count
    }

    fn ensure_healthy(&self, operation: &str) -> RepositoryResult<()> {
        if self.data.read().is_healthy {
            Ok(())
        } else {
            Err(RepositoryError::connection_with_context(
                "Local repository marked unhealthy",
                ErrorContext::new(operation),
            ))
        }
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisRepository for LocalRepository {
    async fn store_analysis(
        &self,
        resource_id: ResourceId,
        analysis: &Analysis,
    ) -> RepositoryResult<()> {
        self.ensure_healthy("store_analysis")?;
        let mut data = self.data.write();
        data.analyses.insert(resource_id, analysis.clone());
        data.store_count += 1;
        Ok(())
    }

    async fn load_analysis(&self, resource_id: ResourceId) -> RepositoryResult<Analysis> {
        self.ensure_healthy("load_analysis")?;
        self.data
            .read()
            .analyses
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    "Analysis not found",
                    ErrorContext::new("load_analysis")
                        .with_entity("analysis")
                        .with_entity_id(resource_id),
                )
            })
    }

    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AnalysisStatus, ResultTable};
    use serde_json::json;
    use uuid::Uuid;

    fn sample_result() -> ResultTable {
        let mut table = ResultTable::new();
        table.insert_column("aoi_id", vec![json!("BRA")]);
        table.insert_column("aoi_type", vec![json!("admin")]);
        table.insert_column("area__ha", vec![json!(120.5)]);
        table
    }

    #[tokio::test]
    async fn test_store_then_load_round_trip() {
        let repo = LocalRepository::new();
        let id = Uuid::new_v4();
        let analysis = Analysis::complete(json!({"analytic": "tree_cover"}), sample_result());

        repo.store_analysis(id, &analysis).await.unwrap();
        assert_eq!(repo.load_analysis(id).await.unwrap(), analysis);
    }

    #[tokio::test]
    async fn test_load_unknown_is_not_found() {
        let repo = LocalRepository::new();
        let err = repo.load_analysis(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_store_overwrites_pending_record() {
        let repo = LocalRepository::new();
        let id = Uuid::new_v4();
        let metadata = json!({"analytic": "carbon_flux"});

        repo.store_analysis(id, &Analysis::pending(metadata.clone()))
            .await
            .unwrap();
        repo.store_analysis(id, &Analysis::complete(metadata, sample_result()))
            .await
            .unwrap();

        let loaded = repo.load_analysis(id).await.unwrap();
        assert_eq!(loaded.status, AnalysisStatus::Complete);
        assert_eq!(repo.analysis_count(), 1);
        assert_eq!(repo.store_count(), 2);
    }

    #[tokio::test]
    async fn test_unhealthy_repository_rejects_operations() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);

        assert!(!repo.health_check().await.unwrap());
        let err = repo
            .store_analysis(Uuid::new_v4(), &Analysis::pending(json!({})))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_clear_keeps_health_flag() {
        let repo = LocalRepository::new();
        repo.store_analysis(Uuid::new_v4(), &Analysis::pending(json!({})))
            .await
            .unwrap();
        repo.set_healthy(false);
        repo.clear();

        assert_eq!(repo.analysis_count(), 0);
        assert!(!repo.health_check().await.unwrap());
    }
}
