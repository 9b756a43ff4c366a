//! Capability traits for compute handlers.
//!
//! Both precalc and OTF handlers return the same result shape: `aoi_id` and
//! `aoi_type` columns plus one column per requested field, rows ordered by
//! the position of their AOI in the request.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use super::query::DatasetQuery;
use crate::api::{aoi_id_text, AoiType, ResultTable, AOI_ID_COLUMN};
use crate::error::{AnalysisResult, ComputeError};

/// Anything that can satisfy a [`DatasetQuery`] for a set of AOIs.
#[async_trait]
pub trait ComputeHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        aoi_type: AoiType,
        aoi_ids: &[String],
        query: &DatasetQuery,
    ) -> AnalysisResult<ResultTable>;
}

/// A handler backed by precomputed aggregates.
pub trait PrecalcHandler: ComputeHandler {
    /// Pure eligibility check over the query shape and dataset coverage.
    fn should_handle(&self, aoi_type: AoiType, aoi_ids: &[String], query: &DatasetQuery) -> bool;
}

/// Reorder rows so that `aoi_id` follows the request order.
///
/// Rows of the same AOI keep their backend order. Rows for AOIs outside the
/// request are dropped. Numeric ids match their decimal text, and the
/// `aoi_id` column is rewritten with the ids as requested.
pub(crate) fn order_rows_by_aoi(
    backend: &str,
    table: ResultTable,
    aoi_ids: &[String],
) -> Result<ResultTable, ComputeError> {
    if !table.is_rectangular() {
        return Err(ComputeError::malformed(backend, "columns have different lengths"));
    }
    if table.is_empty() {
        return Ok(table);
    }

    let mut position: HashMap<&str, usize> = HashMap::with_capacity(aoi_ids.len());
    for (i, id) in aoi_ids.iter().enumerate() {
        position.entry(id.as_str()).or_insert(i);
    }

    let ids = table
        .column(AOI_ID_COLUMN)
        .ok_or_else(|| ComputeError::malformed(backend, "result has no aoi_id column"))?;

    let mut rows: Vec<(usize, usize)> = ids
        .iter()
        .enumerate()
        .filter_map(|(row, value)| {
            aoi_id_text(value)
                .and_then(|id| position.get(id.as_str()).copied())
                .map(|rank| (rank, row))
        })
        .collect();
    rows.sort_by_key(|&(rank, _)| rank);

    let mut ordered = ResultTable::new();
    for (name, values) in table.into_inner() {
        let column: Vec<Value> = if name == AOI_ID_COLUMN {
            rows.iter()
                .map(|&(rank, _)| Value::String(aoi_ids[rank].clone()))
                .collect()
        } else {
            rows.iter().map(|&(_, row)| values[row].clone()).collect()
        };
        ordered.insert_column(name, column);
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_follow_request_order() {
        let mut table = ResultTable::new();
        table.insert_column(AOI_ID_COLUMN, vec![json!("B"), json!("A"), json!("B")]);
        table.insert_column("loss_year", vec![json!(2001), json!(2001), json!(2002)]);

        let ordered =
            order_rows_by_aoi("test", table, &["A".to_string(), "B".to_string()]).unwrap();
        assert_eq!(
            ordered.column(AOI_ID_COLUMN).unwrap(),
            &vec![json!("A"), json!("B"), json!("B")]
        );
        assert_eq!(
            ordered.column("loss_year").unwrap(),
            &vec![json!(2001), json!(2001), json!(2002)]
        );
    }

    #[test]
    fn test_rows_outside_request_are_dropped() {
        let mut table = ResultTable::new();
        table.insert_column(AOI_ID_COLUMN, vec![json!("A"), json!("Z")]);
        table.insert_column("area__ha", vec![json!(1.0), json!(2.0)]);

        let ordered = order_rows_by_aoi("test", table, &["A".to_string()]).unwrap();
        assert_eq!(ordered.row_count(), 1);
    }

    #[test]
    fn test_numeric_aoi_ids_match_requested_text() {
        let mut table = ResultTable::new();
        table.insert_column(AOI_ID_COLUMN, vec![json!(902), json!(555), json!(null)]);
        table.insert_column("area__ha", vec![json!(2.0), json!(1.0), json!(3.0)]);

        let ordered =
            order_rows_by_aoi("test", table, &["555".to_string(), "902".to_string()]).unwrap();
        assert_eq!(
            ordered.column(AOI_ID_COLUMN).unwrap(),
            &vec![json!("555"), json!("902")]
        );
        assert_eq!(
            ordered.column("area__ha").unwrap(),
            &vec![json!(1.0), json!(2.0)]
        );
    }

    #[test]
    fn test_ragged_table_is_malformed() {
        let mut table = ResultTable::new();
        table.insert_column(AOI_ID_COLUMN, vec![json!("A")]);
        table.insert_column("area__ha", vec![]);

        let err = order_rows_by_aoi("test", table, &["A".to_string()]).unwrap_err();
        assert!(matches!(err, ComputeError::MalformedPayload { .. }));
    }
}
