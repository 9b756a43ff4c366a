//! Analyzers turn a validated analytic request into an [`Outcome`].
//!
//! Two strategies exist behind the one [`Analyzer`] trait:
//!
//! - [`ImmediateAnalyzer`] computes during the call and returns
//!   [`Outcome::Immediate`]; it never touches the repository.
//! - [`DeferredAnalyzer`] stores a pending record under the request's
//!   fingerprint, computes in the background and returns
//!   [`Outcome::Deferred`].
//!
//! Callers go through the [`AnalyzerRegistry`] and never branch on which
//! strategy an analytic uses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::api::{Analysis, Outcome};
use crate::compute::ComputeEngine;
use crate::db::repository::AnalysisRepository;
use crate::error::{AnalysisResult, ValidationError};
use crate::services::job_tracker::JobTracker;

pub mod deferred;
pub mod immediate;
pub mod requests;

pub use deferred::DeferredAnalyzer;
pub use immediate::ImmediateAnalyzer;
pub use requests::{
    AnalyticRequest, CarbonFluxRequest, Intersection, TreeCoverGainRequest, TreeCoverLossRequest,
    TreeCoverRequest,
};

/// The analytics this service offers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticType {
    TreeCover,
    TreeCoverGain,
    TreeCoverLoss,
    CarbonFlux,
}

impl AnalyticType {
    pub const ALL: [AnalyticType; 4] = [
        AnalyticType::TreeCover,
        AnalyticType::TreeCoverGain,
        AnalyticType::TreeCoverLoss,
        AnalyticType::CarbonFlux,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticType::TreeCover => "tree_cover",
            AnalyticType::TreeCoverGain => "tree_cover_gain",
            AnalyticType::TreeCoverLoss => "tree_cover_loss",
            AnalyticType::CarbonFlux => "carbon_flux",
        }
    }
}

impl fmt::Display for AnalyticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyticType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        AnalyticType::ALL
            .into_iter()
            .find(|analytic| analytic.as_str() == normalized)
            .ok_or_else(|| format!("Unknown analytic: {}", s))
    }
}

/// One analytic's request handling.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn analytic(&self) -> AnalyticType;

    /// Validate `analysis.metadata` and run the analytic.
    ///
    /// On success `analysis` holds the normalized metadata and the status
    /// the job has reached. Validation failures leave it untouched.
    async fn analyze(&self, analysis: &mut Analysis) -> AnalysisResult<Outcome>;
}

/// Analyzers by analytic type.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<AnalyticType, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard catalogue: tree cover and gain answer immediately, loss
    /// and carbon flux run as deferred jobs.
    pub fn with_defaults(
        engine: Arc<ComputeEngine>,
        repository: Arc<dyn AnalysisRepository>,
        tracker: JobTracker,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImmediateAnalyzer::<TreeCoverRequest>::new(
            engine.clone(),
        )));
        registry.register(Arc::new(ImmediateAnalyzer::<TreeCoverGainRequest>::new(
            engine.clone(),
        )));
        registry.register(Arc::new(DeferredAnalyzer::<TreeCoverLossRequest>::new(
            engine.clone(),
            repository.clone(),
            tracker.clone(),
        )));
        registry.register(Arc::new(DeferredAnalyzer::<CarbonFluxRequest>::new(
            engine, repository, tracker,
        )));
        registry
    }

    /// Register an analyzer, replacing any previous one for its analytic.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.insert(analyzer.analytic(), analyzer)
    }

    pub fn get(&self, analytic: AnalyticType) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(&analytic).cloned()
    }

    pub fn analytics(&self) -> impl Iterator<Item = AnalyticType> + '_ {
        self.analyzers.keys().copied()
    }

    pub async fn analyze(
        &self,
        analytic: AnalyticType,
        analysis: &mut Analysis,
    ) -> AnalysisResult<Outcome> {
        let analyzer = self.get(analytic).ok_or_else(|| {
            ValidationError::field("analytic", format!("no analyzer for '{}'", analytic))
        })?;
        analyzer.analyze(analysis).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analytic_type_parsing() {
        assert_eq!("tree_cover_loss".parse::<AnalyticType>(), Ok(AnalyticType::TreeCoverLoss));
        assert_eq!("Carbon-Flux".parse::<AnalyticType>(), Ok(AnalyticType::CarbonFlux));
        assert!("land_use".parse::<AnalyticType>().is_err());

        for analytic in AnalyticType::ALL {
            assert_eq!(analytic.as_str().parse::<AnalyticType>(), Ok(analytic));
        }
    }

    #[tokio::test]
    async fn test_unregistered_analytic_is_a_validation_error() {
        let registry = AnalyzerRegistry::new();
        let mut analysis = Analysis::pending(serde_json::json!({}));
        let err = registry
            .analyze(AnalyticType::TreeCover, &mut analysis)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AnalysisError::Validation(_)));
    }
}
