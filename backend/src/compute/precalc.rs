//! Precomputed aggregate tables served through generated SQL.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::backends::ColumnarBackend;
use super::handler::{order_rows_by_aoi, ComputeHandler, PrecalcHandler};
use super::query::DatasetQuery;
use super::sql::QueryBuilder;
use crate::api::{AoiType, ResultTable, AOI_ID_COLUMN, AOI_TYPE_COLUMN};
use crate::error::AnalysisResult;

/// A precomputed table covering one dataset for some AOI types.
///
/// `fields` maps logical field names to the table's columns; a query is
/// only eligible when every field it references is mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecalcTable {
    pub dataset: String,
    pub table: String,
    pub aoi_types: Vec<AoiType>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl PrecalcTable {
    pub fn new(dataset: &str, table: &str, aoi_types: Vec<AoiType>) -> Self {
        Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
            aoi_types,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, logical: &str, column: &str) -> Self {
        self.fields.insert(logical.to_string(), column.to_string());
        self
    }

    /// True when this table can answer `query` for `aoi_type`.
    pub fn covers(&self, aoi_type: AoiType, query: &DatasetQuery) -> bool {
        self.dataset == query.dataset
            && self.aoi_types.contains(&aoi_type)
            && query
                .referenced_fields()
                .all(|field| self.fields.contains_key(field))
    }
}

/// Built-in precomputed tables, in priority order.
pub fn default_precalc_tables() -> Vec<PrecalcTable> {
    vec![
        PrecalcTable::new("umd_tree_cover_loss", "admin_tree_cover_loss", vec![AoiType::Admin])
            .field("canopy_cover", "umd_tree_cover_density_2000__threshold")
            .field("loss_year", "umd_tree_cover_loss__year")
            .field("driver", "tsc_tree_cover_loss_drivers__driver")
            .field("primary_forest", "is__umd_regional_primary_forest_2001")
            .field("area__ha", "umd_tree_cover_loss__ha"),
        PrecalcTable::new(
            "umd_tree_cover_density_2000",
            "admin_tree_cover",
            vec![AoiType::Admin, AoiType::ProtectedArea],
        )
        .field("canopy_cover", "umd_tree_cover_density_2000__threshold")
        .field("area__ha", "umd_tree_cover_extent_2000__ha"),
        PrecalcTable::new("umd_tree_cover_gain", "admin_tree_cover_gain", vec![AoiType::Admin])
            .field("gain_period", "umd_tree_cover_gain__period")
            .field("gain_area__ha", "umd_tree_cover_gain__ha"),
    ]
}

/// Serves queries from one [`PrecalcTable`].
pub struct TablePrecalcHandler {
    table: PrecalcTable,
    builder: QueryBuilder,
    backend: Arc<dyn ColumnarBackend>,
    name: String,
}

impl TablePrecalcHandler {
    pub fn new(table: PrecalcTable, backend: Arc<dyn ColumnarBackend>) -> Self {
        let builder = QueryBuilder::with_fields(table.fields.clone());
        let name = format!("precalc:{}", table.table);
        Self {
            table,
            builder,
            backend,
            name,
        }
    }
}

#[async_trait]
impl ComputeHandler for TablePrecalcHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        _aoi_type: AoiType,
        aoi_ids: &[String],
        query: &DatasetQuery,
    ) -> AnalysisResult<ResultTable> {
        let mut retargeted = query.clone();
        retargeted.dataset = self.table.table.clone();
        let statement = self.builder.build(aoi_ids, &retargeted)?;
        debug!("{}: {}", self.name, statement);

        let mut table = self.backend.query(&self.table.table, &statement).await?;

        // Group-by columns come back under their backend names
        for field in &query.group_by {
            if field == AOI_ID_COLUMN || field == AOI_TYPE_COLUMN {
                continue;
            }
            let column = self.builder.resolve(&retargeted.dataset, field)?;
            table.rename_column(column.as_str(), field);
        }

        if table.is_empty() {
            return Ok(ResultTable::with_columns(statement_columns(query)));
        }
        Ok(order_rows_by_aoi(&self.name, table, aoi_ids)?)
    }
}

impl PrecalcHandler for TablePrecalcHandler {
    fn should_handle(&self, aoi_type: AoiType, _aoi_ids: &[String], query: &DatasetQuery) -> bool {
        self.table.covers(aoi_type, query)
    }
}

/// Logical output columns of `query`.
pub(crate) fn statement_columns(query: &DatasetQuery) -> Vec<String> {
    let mut columns = vec![AOI_ID_COLUMN.to_string(), AOI_TYPE_COLUMN.to_string()];
    for field in &query.group_by {
        if !columns.contains(field) {
            columns.push(field.clone());
        }
    }
    columns.push(query.aggregation.output_name().to_string());
    columns
}
