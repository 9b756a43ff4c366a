//! On-the-fly computation against the remote raster service.

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

use super::backends::{GeometryResolver, RasterService, ZonalRequest};
use super::handler::ComputeHandler;
use super::precalc::statement_columns;
use super::query::DatasetQuery;
use crate::api::{AoiType, ResultTable, AOI_ID_COLUMN, AOI_TYPE_COLUMN};
use crate::error::{AnalysisResult, ComputeError};

const BACKEND: &str = "otf";

/// Name of the value field in grouped raster responses.
const VALUE_KEY: &str = "value";

/// Resolves each AOI to a geometry and runs one zonal request per geometry,
/// at most `max_concurrent` at a time.
pub struct OtfHandler {
    raster: Arc<dyn RasterService>,
    geometries: Arc<dyn GeometryResolver>,
    projection: String,
    scale: f64,
    max_concurrent: usize,
}

impl OtfHandler {
    pub fn new(raster: Arc<dyn RasterService>, geometries: Arc<dyn GeometryResolver>) -> Self {
        Self {
            raster,
            geometries,
            projection: "EPSG:4326".to_string(),
            scale: 30.0,
            max_concurrent: 8,
        }
    }

    pub fn with_projection(mut self, projection: impl Into<String>, scale: f64) -> Self {
        self.projection = projection.into();
        self.scale = scale;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    fn zonal_request(&self, query: &DatasetQuery, geometry: Value) -> ZonalRequest {
        ZonalRequest {
            dataset: query.dataset.clone(),
            geometry,
            projection: self.projection.clone(),
            scale: self.scale,
            group_by: query.group_by.clone(),
            filters: query.filters.clone(),
            aggregation: query.aggregation.clone(),
        }
    }
}

#[async_trait]
impl ComputeHandler for OtfHandler {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn handle(
        &self,
        aoi_type: AoiType,
        aoi_ids: &[String],
        query: &DatasetQuery,
    ) -> AnalysisResult<ResultTable> {
        let columns = statement_columns(query);
        if aoi_ids.is_empty() {
            return Ok(ResultTable::with_columns(columns));
        }

        let geometries = self.geometries.resolve(aoi_type, aoi_ids).await?;
        debug!(
            "OTF {} for {} geometries (projection={}, scale={})",
            query.dataset,
            geometries.len(),
            self.projection,
            self.scale
        );

        let raster = &self.raster;
        let responses: Vec<(String, Value)> = stream::iter(geometries)
            .map(|(aoi_id, geometry)| {
                let request = self.zonal_request(query, geometry);
                async move {
                    let payload = raster.zonal_stats(&request).await?;
                    Ok::<_, ComputeError>((aoi_id, payload))
                }
            })
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let mut table = ResultTable::with_columns(columns);
        for (aoi_id, payload) in responses {
            append_rows(&mut table, aoi_type, &aoi_id, query, payload)?;
        }
        Ok(table)
    }
}

/// Reshape one raster response into rows of the output table.
///
/// The payload is keyed by dataset name and holds either a scalar (one row)
/// or a list of `{<group-by fields>..., "value": x}` objects (one row each).
fn append_rows(
    table: &mut ResultTable,
    aoi_type: AoiType,
    aoi_id: &str,
    query: &DatasetQuery,
    payload: Value,
) -> Result<(), ComputeError> {
    let output = query.aggregation.output_name().to_string();
    let data = match payload {
        Value::Object(mut map) => map.remove(&query.dataset).ok_or_else(|| {
            ComputeError::malformed(BACKEND, format!("response has no '{}' key", query.dataset))
        })?,
        other => {
            return Err(ComputeError::malformed(
                BACKEND,
                format!("expected object keyed by dataset, got {}", other),
            ))
        }
    };

    let push_row = |table: &mut ResultTable, mut row: serde_json::Map<String, Value>| {
        table.push(AOI_ID_COLUMN, Value::String(aoi_id.to_string()));
        table.push(AOI_TYPE_COLUMN, Value::String(aoi_type.to_string()));
        for field in &query.group_by {
            table.push(field, row.remove(field).unwrap_or(Value::Null));
        }
        table.push(&output, row.remove(VALUE_KEY).unwrap_or(Value::Null));
    };

    match data {
        Value::Array(rows) => {
            for row in rows {
                match row {
                    Value::Object(row) => push_row(table, row),
                    other => {
                        return Err(ComputeError::malformed(
                            BACKEND,
                            format!("expected grouped row object, got {}", other),
                        ))
                    }
                }
            }
        }
        scalar @ (Value::Number(_) | Value::Null) if query.group_by.is_empty() => {
            let mut row = serde_json::Map::new();
            row.insert(VALUE_KEY.to_string(), scalar);
            push_row(table, row);
        }
        other => {
            return Err(ComputeError::malformed(
                BACKEND,
                format!("unexpected value for '{}': {}", query.dataset, other),
            ))
        }
    }
    Ok(())
}
