//! Analytics answered within the request.

use async_trait::async_trait;
use log::{debug, warn};
use std::marker::PhantomData;
use std::sync::Arc;

use super::requests::AnalyticRequest;
use super::{AnalyticType, Analyzer};
use crate::api::{Analysis, AnalysisStatus, Outcome};
use crate::compute::ComputeEngine;
use crate::error::AnalysisResult;

/// Computes the result during `analyze`; performs no repository writes.
pub struct ImmediateAnalyzer<R> {
    engine: Arc<ComputeEngine>,
    _request: PhantomData<fn() -> R>,
}

impl<R: AnalyticRequest> ImmediateAnalyzer<R> {
    pub fn new(engine: Arc<ComputeEngine>) -> Self {
        Self {
            engine,
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<R: AnalyticRequest> Analyzer for ImmediateAnalyzer<R> {
    fn analytic(&self) -> AnalyticType {
        R::ANALYTIC
    }

    async fn analyze(&self, analysis: &mut Analysis) -> AnalysisResult<Outcome> {
        let request = R::parse(&analysis.metadata)?;
        *analysis = Analysis::pending(request.normalized()?);

        let aoi = request.aoi();
        debug!("Computing {} for {} {} AOIs", R::ANALYTIC, aoi.ids.len(), aoi.aoi_type);
        match self
            .engine
            .compute(aoi.aoi_type, &aoi.ids, &request.dataset_query())
            .await
        {
            Ok(result) => {
                analysis.result = result.clone();
                analysis.status = AnalysisStatus::Complete;
                Ok(Outcome::Immediate(result))
            }
            Err(e) => {
                warn!("{} computation failed: {}", R::ANALYTIC, e);
                analysis.status = AnalysisStatus::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::TreeCoverRequest;
    use crate::api::{AoiType, ResultTable, AOI_ID_COLUMN};
    use crate::compute::{ComputeHandler, DatasetQuery};
    use crate::error::{AnalysisError, ComputeError};
    use serde_json::json;

    struct Echo {
        fail: bool,
    }

    #[async_trait]
    impl ComputeHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn handle(
            &self,
            _aoi_type: AoiType,
            aoi_ids: &[String],
            query: &DatasetQuery,
        ) -> AnalysisResult<ResultTable> {
            if self.fail {
                return Err(ComputeError::malformed("echo", "bad payload").into());
            }
            let mut table = ResultTable::new();
            for id in aoi_ids {
                table.push(AOI_ID_COLUMN, json!(id));
                table.push(query.aggregation.output_name(), json!(1.0));
            }
            Ok(table)
        }
    }

    fn analyzer(fail: bool) -> ImmediateAnalyzer<TreeCoverRequest> {
        ImmediateAnalyzer::new(Arc::new(ComputeEngine::new(
            Vec::new(),
            Arc::new(Echo { fail }),
        )))
    }

    #[tokio::test]
    async fn test_result_is_returned_and_recorded() {
        let mut analysis = Analysis::pending(json!({"aoi": {"type": "admin", "ids": ["BRA", "IDN"]}}));
        let outcome = analyzer(false).analyze(&mut analysis).await.unwrap();

        let Outcome::Immediate(result) = outcome else {
            panic!("expected an immediate outcome");
        };
        assert_eq!(result.row_count(), 2);
        assert_eq!(analysis.status, AnalysisStatus::Complete);
        assert_eq!(analysis.result, result);
        assert_eq!(analysis.metadata["canopy_cover"], 30);
        assert_eq!(analysis.metadata["analytic"], "tree_cover");
    }

    #[tokio::test]
    async fn test_compute_failure_marks_failed() {
        let mut analysis = Analysis::pending(json!({"aoi": {"type": "admin", "ids": ["BRA"]}}));
        let err = analyzer(true).analyze(&mut analysis).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Compute(_)));
        assert_eq!(analysis.status, AnalysisStatus::Failed);
    }

    #[tokio::test]
    async fn test_invalid_request_leaves_analysis_untouched() {
        let metadata = json!({"aoi": {"type": "admin", "ids": []}});
        let mut analysis = Analysis::pending(metadata.clone());
        let err = analyzer(false).analyze(&mut analysis).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
        assert_eq!(analysis, Analysis::pending(metadata));
    }
}
