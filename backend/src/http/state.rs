//! Application state for the HTTP server.

use std::sync::Arc;

use crate::analyzers::AnalyzerRegistry;
use crate::db::repository::AnalysisRepository;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository for reading stored analyses
    pub repository: Arc<dyn AnalysisRepository>,
    /// Analyzers by analytic type
    pub registry: Arc<AnalyzerRegistry>,
}

impl AppState {
    pub fn new(repository: Arc<dyn AnalysisRepository>, registry: AnalyzerRegistry) -> Self {
        Self {
            repository,
            registry: Arc::new(registry),
        }
    }
}
