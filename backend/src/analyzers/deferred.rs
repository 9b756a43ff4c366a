//! Long-running analytics stored under their fingerprint.

use async_trait::async_trait;
use log::{error, info, warn};
use std::marker::PhantomData;
use std::sync::Arc;

use super::requests::AnalyticRequest;
use super::{AnalyticType, Analyzer};
use crate::api::{Analysis, AnalysisStatus, Outcome, ResourceId};
use crate::compute::ComputeEngine;
use crate::db::fingerprint::fingerprint_value;
use crate::db::repository::AnalysisRepository;
use crate::error::AnalysisResult;
use crate::services::job_tracker::{JobGuard, JobTracker};

/// Stores a pending record and completes it in a background task.
///
/// Per fingerprint:
/// - a stored `complete` record is returned as-is, nothing is recomputed;
/// - a job already running in this process is joined, nothing is written;
/// - otherwise the pending record is stored (the one write of the call)
///   and the task later replaces it with `complete` or `failed`.
pub struct DeferredAnalyzer<R> {
    engine: Arc<ComputeEngine>,
    repository: Arc<dyn AnalysisRepository>,
    tracker: JobTracker,
    _request: PhantomData<fn() -> R>,
}

impl<R: AnalyticRequest> DeferredAnalyzer<R> {
    pub fn new(
        engine: Arc<ComputeEngine>,
        repository: Arc<dyn AnalysisRepository>,
        tracker: JobTracker,
    ) -> Self {
        Self {
            engine,
            repository,
            tracker,
            _request: PhantomData,
        }
    }

    async fn load_complete(&self, resource_id: ResourceId) -> AnalysisResult<Option<Analysis>> {
        match self.repository.load_analysis(resource_id).await {
            Ok(existing) if existing.status == AnalysisStatus::Complete => {
                info!("Analysis {} already complete", resource_id);
                Ok(Some(existing))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn spawn_job(&self, guard: JobGuard, request: R, pending: Analysis) {
        let engine = self.engine.clone();
        let repository = self.repository.clone();
        tokio::spawn(async move {
            let resource_id = guard.resource_id();
            let record = run_job(&engine, &request, pending).await;
            if let Err(e) = repository.store_analysis(resource_id, &record).await {
                error!(
                    "Failed to store {} result for analysis {}: {}",
                    record.status, resource_id, e
                );
            }
            drop(guard);
        });
    }
}

async fn run_job<R: AnalyticRequest>(
    engine: &ComputeEngine,
    request: &R,
    pending: Analysis,
) -> Analysis {
    let aoi = request.aoi();
    match engine
        .compute(aoi.aoi_type, &aoi.ids, &request.dataset_query())
        .await
    {
        Ok(result) => {
            info!("{} analysis complete ({} rows)", R::ANALYTIC, result.row_count());
            Analysis::complete(pending.metadata, result)
        }
        Err(e) => {
            warn!("{} analysis failed: {}", R::ANALYTIC, e);
            Analysis::failed(pending.metadata)
        }
    }
}

#[async_trait]
impl<R: AnalyticRequest> Analyzer for DeferredAnalyzer<R> {
    fn analytic(&self) -> AnalyticType {
        R::ANALYTIC
    }

    async fn analyze(&self, analysis: &mut Analysis) -> AnalysisResult<Outcome> {
        let request = R::parse(&analysis.metadata)?;
        let metadata = request.normalized()?;
        let resource_id: ResourceId = fingerprint_value(&metadata);
        *analysis = Analysis::pending(metadata);

        if let Some(existing) = self.load_complete(resource_id).await? {
            *analysis = existing;
            return Ok(Outcome::Deferred(resource_id));
        }

        let Some(guard) = self.tracker.try_begin(resource_id, R::ANALYTIC.as_str()) else {
            warn!("Analysis {} is already running, joining it", resource_id);
            return Ok(Outcome::Deferred(resource_id));
        };

        // A job may have finished between the load and the claim.
        if let Some(existing) = self.load_complete(resource_id).await? {
            *analysis = existing;
            return Ok(Outcome::Deferred(resource_id));
        }

        self.repository.store_analysis(resource_id, analysis).await?;
        info!("Accepted {} analysis {}", R::ANALYTIC, resource_id);

        self.spawn_job(guard, request, analysis.clone());
        Ok(Outcome::Deferred(resource_id))
    }
}
