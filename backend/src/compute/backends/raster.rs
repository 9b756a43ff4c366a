//! Remote raster/vector compute service.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::check_status;
use super::credentials::ScopedCredentials;
use crate::compute::query::{Aggregation, Filter};
use crate::error::{ComputeError, ComputeResult};

const BACKEND: &str = "raster-api";

/// One zonal statistics request for a single geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalRequest {
    pub dataset: String,
    pub geometry: Value,
    pub projection: String,
    pub scale: f64,
    pub group_by: Vec<String>,
    pub filters: Vec<Filter>,
    pub aggregation: Aggregation,
}

/// Runs zonal computations. The response is keyed by dataset name.
#[async_trait]
pub trait RasterService: Send + Sync {
    async fn zonal_stats(&self, request: &ZonalRequest) -> ComputeResult<Value>;
}

/// Client for `POST {base_url}/analysis/zonal`.
pub struct HttpRasterService {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<ScopedCredentials>,
}

impl HttpRasterService {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<ScopedCredentials>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl RasterService for HttpRasterService {
    async fn zonal_stats(&self, request: &ZonalRequest) -> ComputeResult<Value> {
        let lease = self.credentials.acquire().await?;
        let http_request = self
            .client
            .post(format!("{}/analysis/zonal", self.base_url))
            .json(request);
        let response = lease
            .bearer(http_request)
            .send()
            .await
            .map_err(|e| ComputeError::transport(BACKEND, e))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
        }
        let response = check_status(BACKEND, response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ComputeError::malformed(BACKEND, e.to_string()))?;

        // Some deployments wrap the payload in {"data": ...}
        match body {
            Value::Object(mut map) if map.contains_key("data") && !map.contains_key(&request.dataset) => {
                Ok(map.remove("data").unwrap_or(Value::Null))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zonal_request_wire_shape() {
        let request = ZonalRequest {
            dataset: "umd_tree_cover_loss".to_string(),
            geometry: json!({"type": "Point", "coordinates": [0.0, 0.0]}),
            projection: "EPSG:4326".to_string(),
            scale: 30.0,
            group_by: vec!["loss_year".to_string()],
            filters: vec![Filter::new("canopy_cover", crate::compute::query::Operator::Ge, 30i64)],
            aggregation: Aggregation::sum("area__ha"),
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["dataset"], "umd_tree_cover_loss");
        assert_eq!(wire["projection"], "EPSG:4326");
        assert_eq!(wire["filters"][0]["op"], ">=");
        assert_eq!(wire["aggregation"]["function"], "sum");
    }
}
