//! Columnar query backend.

use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::check_status;
use super::credentials::ScopedCredentials;
use crate::api::ResultTable;
use crate::compute::sql::SelectStatement;
use crate::error::{ComputeError, ComputeResult};

const BACKEND: &str = "data-api";

/// Executes SQL against a named dataset and returns a columnar table.
#[async_trait]
pub trait ColumnarBackend: Send + Sync {
    async fn query(&self, dataset: &str, sql: &SelectStatement) -> ComputeResult<ResultTable>;
}

/// Client for the dataset query API.
///
/// Issues `GET {base_url}/dataset/{dataset}/latest/query/json?sql=...` and
/// expects `{"data": [{column: value, ...}, ...]}`.
pub struct HttpColumnarBackend {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<ScopedCredentials>,
}

impl HttpColumnarBackend {
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

    fn endpoint(&self, dataset: &str) -> String {
        format!("{}/dataset/{}/latest/query/json", self.base_url, dataset)
    }
}

#[async_trait]
impl ColumnarBackend for HttpColumnarBackend {
    async fn query(&self, dataset: &str, sql: &SelectStatement) -> ComputeResult<ResultTable> {
        let sql = sql.to_string();
        debug!("Querying {} with: {}", dataset, sql);

        let lease = self.credentials.acquire().await?;
        let request = self
            .client
            .get(self.endpoint(dataset))
            .query(&[("sql", sql.as_str())]);
        let response = lease
            .api_key(request)
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
        rows_to_columns(BACKEND, body)
    }
}

/// Pivot `{"data": [row, ...]}` into a columnar table.
///
/// Missing keys become `null` so every column keeps the same length.
pub(crate) fn rows_to_columns(backend: &str, body: Value) -> ComputeResult<ResultTable> {
    let rows = match body {
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => return Err(ComputeError::malformed(backend, "missing 'data' array")),
        },
        _ => return Err(ComputeError::malformed(backend, "expected a JSON object")),
    };

    let rows: Vec<Map<String, Value>> = rows
        .into_iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map),
            other => Err(ComputeError::malformed(
                backend,
                format!("expected row object, got {}", other),
            )),
        })
        .collect::<ComputeResult<_>>()?;

    let mut table = ResultTable::new();
    for row in &rows {
        for key in row.keys() {
            if table.column(key).is_none() {
                table.insert_column(key.clone(), Vec::with_capacity(rows.len()));
            }
        }
    }
    let columns: Vec<String> = table.columns().cloned().collect();
    for row in &rows {
        for column in &columns {
            table.push(column, row.get(column).cloned().unwrap_or(Value::Null));
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_are_pivoted() {
        let body = json!({"data": [
            {"aoi_id": "BRA", "area__ha": 1.5},
            {"aoi_id": "IDN", "area__ha": 2.0},
        ]});
        let table = rows_to_columns("test", body).unwrap();
        assert_eq!(table.column("aoi_id").unwrap(), &vec![json!("BRA"), json!("IDN")]);
        assert_eq!(table.column("area__ha").unwrap(), &vec![json!(1.5), json!(2.0)]);
    }

    #[test]
    fn test_missing_keys_become_null() {
        let body = json!({"data": [{"a": 1}, {"b": 2}]});
        let table = rows_to_columns("test", body).unwrap();
        assert!(table.is_rectangular());
        assert_eq!(table.column("a").unwrap(), &vec![json!(1), Value::Null]);
    }

    #[test]
    fn test_empty_data_gives_empty_table() {
        let table = rows_to_columns("test", json!({"data": []})).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_envelope_without_data_is_malformed() {
        let err = rows_to_columns("test", json!({"status": "ok"})).unwrap_err();
        assert!(matches!(err, ComputeError::MalformedPayload { .. }));
    }
}
