//! AOI id to geometry resolution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::columnar::ColumnarBackend;
use crate::api::{aoi_id_text, AoiType, AOI_ID_COLUMN};
use crate::compute::query::Operator;
use crate::compute::sql::{Expr, Ident, Literal, Predicate, SelectItem, SelectStatement};
use crate::error::{AnalysisResult, ComputeError, ValidationError};

const BACKEND: &str = "geometry-resolver";
const GEOMETRY_COLUMN: &str = "geometry";

/// Looks up GeoJSON geometries for AOI ids.
#[async_trait]
pub trait GeometryResolver: Send + Sync {
    /// Geometries in request order, one per id.
    async fn resolve(&self, aoi_type: AoiType, aoi_ids: &[String])
        -> AnalysisResult<Vec<(String, Value)>>;
}

/// Where the boundaries of one AOI type are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryTable {
    pub table: String,
    pub id_column: String,
    #[serde(default = "default_geometry_column")]
    pub geometry_column: String,
}

fn default_geometry_column() -> String {
    "geom".to_string()
}

impl BoundaryTable {
    pub fn new(table: &str, id_column: &str) -> Self {
        Self {
            table: table.to_string(),
            id_column: id_column.to_string(),
            geometry_column: default_geometry_column(),
        }
    }

    /// `SELECT <id> AS aoi_id, ST_AsGeoJSON(<geom>) AS geometry FROM <table> WHERE <id> in (...)`
    pub fn statement(&self, aoi_ids: &[String]) -> AnalysisResult<SelectStatement> {
        let id = Ident::new(&self.id_column)?;
        let ids = Literal::List(aoi_ids.iter().cloned().map(Literal::Text).collect());
        Ok(SelectStatement {
            columns: vec![
                SelectItem::aliased(Expr::Column(id.clone()), Ident::new(AOI_ID_COLUMN)?),
                SelectItem::aliased(
                    Expr::Function {
                        name: "ST_AsGeoJSON",
                        argument: Ident::new(&self.geometry_column)?,
                    },
                    Ident::new(GEOMETRY_COLUMN)?,
                ),
            ],
            from: Ident::new(&self.table)?,
            predicates: vec![Predicate::new(id, Operator::In, ids)?],
            group_by: Vec::new(),
        })
    }
}

/// Built-in boundary tables.
pub fn default_boundaries() -> BTreeMap<AoiType, BoundaryTable> {
    BTreeMap::from([
        (AoiType::Admin, BoundaryTable::new("gadm_administrative_boundaries", "gid")),
        (AoiType::ProtectedArea, BoundaryTable::new("wdpa_protected_areas", "wdpa_pid")),
        (
            AoiType::KeyBiodiversityArea,
            BoundaryTable::new("birdlife_key_biodiversity_areas", "sitrecid"),
        ),
        (
            AoiType::IndigenousLand,
            BoundaryTable::new("landmark_indigenous_and_community_lands", "landmark_id"),
        ),
    ])
}

/// Reads boundaries through the columnar backend.
pub struct ColumnarGeometryResolver {
    backend: Arc<dyn ColumnarBackend>,
    boundaries: BTreeMap<AoiType, BoundaryTable>,
}

impl ColumnarGeometryResolver {
    pub fn new(backend: Arc<dyn ColumnarBackend>, boundaries: BTreeMap<AoiType, BoundaryTable>) -> Self {
        Self { backend, boundaries }
    }
}

#[async_trait]
impl GeometryResolver for ColumnarGeometryResolver {
    async fn resolve(
        &self,
        aoi_type: AoiType,
        aoi_ids: &[String],
    ) -> AnalysisResult<Vec<(String, Value)>> {
        if aoi_ids.is_empty() {
            return Ok(Vec::new());
        }
        let boundary = self.boundaries.get(&aoi_type).ok_or_else(|| {
            ValidationError::field("aoi.type", format!("no boundary table for '{}'", aoi_type))
        })?;

        let statement = boundary.statement(aoi_ids)?;
        let table = self.backend.query(&boundary.table, &statement).await?;

        let ids = table.column(AOI_ID_COLUMN);
        let geometries = table.column(GEOMETRY_COLUMN);
        let mut found: HashMap<String, Value> = HashMap::new();
        if let (Some(ids), Some(geometries)) = (ids, geometries) {
            for (id, geometry) in ids.iter().zip(geometries) {
                if let Some(id) = aoi_id_text(id) {
                    found.insert(id, parse_geometry(geometry)?);
                }
            }
        }

        aoi_ids
            .iter()
            .map(|id| {
                found
                    .get(id)
                    .map(|geometry| (id.clone(), geometry.clone()))
                    .ok_or_else(|| {
                        ComputeError::malformed(BACKEND, format!("no geometry for AOI '{}'", id))
                            .into()
                    })
            })
            .collect()
    }
}

/// `ST_AsGeoJSON` yields text; some backends already return an object.
fn parse_geometry(value: &Value) -> Result<Value, ComputeError> {
    match value {
        Value::String(text) => serde_json::from_str(text)
            .map_err(|e| ComputeError::malformed(BACKEND, format!("invalid GeoJSON: {}", e))),
        Value::Object(_) => Ok(value.clone()),
        other => Err(ComputeError::malformed(
            BACKEND,
            format!("unexpected geometry value {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ResultTable;
    use crate::error::{AnalysisError, ComputeResult};
    use serde_json::json;

    struct Boundaries;

    #[async_trait]
    impl ColumnarBackend for Boundaries {
        async fn query(&self, _dataset: &str, _sql: &SelectStatement) -> ComputeResult<ResultTable> {
            let mut table = ResultTable::new();
            table.insert_column(AOI_ID_COLUMN, vec![json!("IDN"), json!("BRA")]);
            table.insert_column(
                GEOMETRY_COLUMN,
                vec![
                    json!(r#"{"type":"Point","coordinates":[1,1]}"#),
                    json!({"type": "Point", "coordinates": [2, 2]}),
                ],
            );
            Ok(table)
        }
    }

    #[test]
    fn test_boundary_statement() {
        let sql = BoundaryTable::new("gadm_administrative_boundaries", "gid")
            .statement(&["BRA".to_string()])
            .unwrap()
            .to_string();
        assert_eq!(
            sql,
            "SELECT gid AS aoi_id, ST_AsGeoJSON(geom) AS geometry \
             FROM gadm_administrative_boundaries WHERE gid in ('BRA')"
        );
    }

    #[tokio::test]
    async fn test_geometries_follow_request_order() {
        let resolver = ColumnarGeometryResolver::new(Arc::new(Boundaries), default_boundaries());
        let resolved = resolver
            .resolve(AoiType::Admin, &["BRA".to_string(), "IDN".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved[0].0, "BRA");
        assert_eq!(resolved[0].1["coordinates"], json!([2, 2]));
        assert_eq!(resolved[1].1["coordinates"], json!([1, 1]));
    }

    #[tokio::test]
    async fn test_repeated_ids_share_a_geometry() {
        let resolver = ColumnarGeometryResolver::new(Arc::new(Boundaries), default_boundaries());
        let resolved = resolver
            .resolve(
                AoiType::Admin,
                &["BRA".to_string(), "IDN".to_string(), "BRA".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[2].0, "BRA");
        assert_eq!(resolved[2].1, resolved[0].1);
    }

    struct NumericIds;

    #[async_trait]
    impl ColumnarBackend for NumericIds {
        async fn query(&self, _dataset: &str, _sql: &SelectStatement) -> ComputeResult<ResultTable> {
            let mut table = ResultTable::new();
            table.insert_column(AOI_ID_COLUMN, vec![json!(555)]);
            table.insert_column(
                GEOMETRY_COLUMN,
                vec![json!({"type": "Point", "coordinates": [3, 3]})],
            );
            Ok(table)
        }
    }

    #[tokio::test]
    async fn test_numeric_ids_match_requested_text() {
        let resolver = ColumnarGeometryResolver::new(Arc::new(NumericIds), default_boundaries());
        let resolved = resolver
            .resolve(AoiType::ProtectedArea, &["555".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved[0].0, "555");
        assert_eq!(resolved[0].1["coordinates"], json!([3, 3]));
    }

    #[tokio::test]
    async fn test_unknown_id_fails() {
        let resolver = ColumnarGeometryResolver::new(Arc::new(Boundaries), default_boundaries());
        let err = resolver
            .resolve(AoiType::Admin, &["FRA".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Compute(ComputeError::MalformedPayload { .. })));
    }

    #[tokio::test]
    async fn test_unconfigured_type_is_validation_error() {
        let resolver = ColumnarGeometryResolver::new(Arc::new(Boundaries), BTreeMap::new());
        let err = resolver
            .resolve(AoiType::ProtectedArea, &["1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }
}
