//! First-match-wins routing between precalc handlers and the OTF fallback.

use log::debug;
use std::sync::Arc;
use std::time::Duration;

use super::backends::{
    ColumnarBackend, ColumnarGeometryResolver, HttpColumnarBackend, HttpRasterService,
};
use super::handler::{ComputeHandler, PrecalcHandler};
use super::otf::OtfHandler;
use super::precalc::TablePrecalcHandler;
use super::query::DatasetQuery;
use crate::api::{unique_ids, AoiType, ResultTable};
use crate::config::AppConfig;
use crate::error::AnalysisResult;

/// Routes each query to exactly one handler.
///
/// Precalc handlers are consulted in order; the first whose
/// `should_handle` accepts runs. When none accept, the OTF handler runs.
/// Repeated AOI ids are dropped before routing. Handler errors propagate
/// unchanged.
#[derive(Clone)]
pub struct ComputeEngine {
    precalc: Vec<Arc<dyn PrecalcHandler>>,
    otf: Arc<dyn ComputeHandler>,
}

impl ComputeEngine {
    pub fn new(precalc: Vec<Arc<dyn PrecalcHandler>>, otf: Arc<dyn ComputeHandler>) -> Self {
        Self { precalc, otf }
    }

    /// Build the HTTP-backed engine described by `config`.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let compute = &config.compute;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(compute.request_timeout_secs))
            .build()?;
        let credentials = Arc::new(compute.credentials(client.clone()));

        let columnar: Arc<dyn ColumnarBackend> = Arc::new(HttpColumnarBackend::new(
            client.clone(),
            &compute.data_api_url,
            credentials.clone(),
        ));
        let precalc = config
            .precalc_tables()
            .into_iter()
            .map(|table| {
                Arc::new(TablePrecalcHandler::new(table, columnar.clone())) as Arc<dyn PrecalcHandler>
            })
            .collect();

        let geometries = Arc::new(ColumnarGeometryResolver::new(
            columnar.clone(),
            config.boundary_tables()?,
        ));
        let raster = Arc::new(HttpRasterService::new(
            client,
            &compute.raster_api_url,
            credentials,
        ));
        let otf = OtfHandler::new(raster, geometries)
            .with_projection(&compute.projection, compute.scale)
            .with_max_concurrent(compute.max_concurrent_requests);

        Ok(Self::new(precalc, Arc::new(otf)))
    }

    pub async fn compute(
        &self,
        aoi_type: AoiType,
        aoi_ids: &[String],
        query: &DatasetQuery,
    ) -> AnalysisResult<ResultTable> {
        let aoi_ids = &unique_ids(aoi_ids);
        for handler in &self.precalc {
            if handler.should_handle(aoi_type, aoi_ids, query) {
                debug!("Routing {} for {} AOIs to {}", query.dataset, aoi_type, handler.name());
                return handler.handle(aoi_type, aoi_ids, query).await;
            }
        }
        debug!(
            "No precalc table covers {} for {} AOIs, using {}",
            query.dataset,
            aoi_type,
            self.otf.name()
        );
        self.otf.handle(aoi_type, aoi_ids, query).await
    }

    pub fn precalc_count(&self) -> usize {
        self.precalc.len()
    }
}
