#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use land_analytics::api::{Analysis, AnalysisStatus, AoiType, ResourceId, ResultTable};
use land_analytics::compute::backends::{ColumnarBackend, GeometryResolver, RasterService, ZonalRequest};
use land_analytics::compute::{
    default_precalc_tables, ComputeEngine, OtfHandler, PrecalcHandler, SelectStatement,
    TablePrecalcHandler,
};
use land_analytics::db::repository::AnalysisRepository;
use land_analytics::error::{AnalysisResult, ComputeError, ComputeResult};
use serde_json::{json, Value};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores variables on unwind and serializes access to process-global env
/// vars across tests running in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

// =============================================================================
// Fake backends
// =============================================================================

/// Columnar backend answering every query with a canned table.
#[derive(Default)]
pub struct FakeColumnar {
    pub response: Mutex<ResultTable>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeColumnar {
    pub fn answering(response: ResultTable) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// `(dataset, sql)` of every query received.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ColumnarBackend for FakeColumnar {
    async fn query(&self, dataset: &str, sql: &SelectStatement) -> ComputeResult<ResultTable> {
        self.calls
            .lock()
            .unwrap()
            .push((dataset.to_string(), sql.to_string()));
        Ok(self.response.lock().unwrap().clone())
    }
}

/// Raster service returning a scalar per call, or failing.
pub struct FakeRaster {
    pub value: f64,
    pub fail: bool,
    pub requests: Mutex<Vec<ZonalRequest>>,
}

impl FakeRaster {
    pub fn returning(value: f64) -> Arc<Self> {
        Arc::new(Self {
            value,
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            value: 0.0,
            fail: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn datasets(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.dataset.clone())
            .collect()
    }
}

#[async_trait]
impl RasterService for FakeRaster {
    async fn zonal_stats(&self, request: &ZonalRequest) -> ComputeResult<Value> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ComputeError::Backend {
                backend: "raster".to_string(),
                status: 503,
                detail: "unavailable".to_string(),
            });
        }
        let data = if request.group_by.is_empty() {
            json!(self.value)
        } else {
            let mut row = serde_json::Map::new();
            for field in &request.group_by {
                row.insert(field.clone(), json!(true));
            }
            row.insert("value".to_string(), json!(self.value));
            json!([row])
        };
        let mut payload = serde_json::Map::new();
        payload.insert(request.dataset.clone(), data);
        Ok(Value::Object(payload))
    }
}

/// Resolves every id to the same point geometry.
pub struct FakeGeometries;

#[async_trait]
impl GeometryResolver for FakeGeometries {
    async fn resolve(&self, _aoi_type: AoiType, aoi_ids: &[String]) -> AnalysisResult<Vec<(String, Value)>> {
        Ok(aoi_ids
            .iter()
            .map(|id| (id.clone(), json!({"type": "Point", "coordinates": [0.0, 0.0]})))
            .collect())
    }
}

/// Engine with the built-in precalc tables over `columnar` and OTF over `raster`.
pub fn engine(columnar: Arc<FakeColumnar>, raster: Arc<FakeRaster>) -> ComputeEngine {
    let precalc: Vec<Arc<dyn PrecalcHandler>> = default_precalc_tables()
        .into_iter()
        .map(|table| {
            Arc::new(TablePrecalcHandler::new(table, columnar.clone())) as Arc<dyn PrecalcHandler>
        })
        .collect();
    let otf = OtfHandler::new(raster, Arc::new(FakeGeometries));
    ComputeEngine::new(precalc, Arc::new(otf))
}

/// Table as a precalc backend would return it for BRA and IDN.
pub fn tree_cover_rows() -> ResultTable {
    let mut table = ResultTable::new();
    table.insert_column("aoi_id", vec![json!("IDN"), json!("BRA")]);
    table.insert_column("aoi_type", vec![json!("admin"), json!("admin")]);
    table.insert_column("area__ha", vec![json!(90.5), json!(480.25)]);
    table
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Poll `repository` until the analysis reaches `status`.
pub async fn wait_for_status(
    repository: &dyn AnalysisRepository,
    resource_id: ResourceId,
    status: AnalysisStatus,
) -> Analysis {
    for _ in 0..200 {
        if let Ok(analysis) = repository.load_analysis(resource_id).await {
            if analysis.status == status {
                return analysis;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis {} never reached {}", resource_id, status);
}
