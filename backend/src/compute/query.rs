//! Structured aggregation requests.
//!
//! A [`DatasetQuery`] names a dataset by its logical name and refers to
//! logical field names only; handlers resolve those to backend columns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators accepted in filters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::In => "in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<FilterValue>),
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Integer(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Integer(v as i64)
    }
}

impl From<u16> for FilterValue {
    fn from(v: u16) -> Self {
        FilterValue::Integer(v as i64)
    }
}

impl From<u8> for FilterValue {
    fn from(v: u8) -> Self {
        FilterValue::Integer(v as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        FilterValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// `field <operator> value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(rename = "op")]
    pub operator: Operator,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Aggregate functions the backends understand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Count => "COUNT",
        }
    }
}

/// Wildcard argument, only meaningful for `COUNT`.
pub const ALL_ROWS: &str = "*";

/// The single aggregated value column of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub function: AggregateFunction,
    pub field: String,
}

impl Aggregation {
    pub fn new(function: AggregateFunction, field: impl Into<String>) -> Self {
        Self {
            function,
            field: field.into(),
        }
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Sum, field)
    }

    pub fn count() -> Self {
        Self::new(AggregateFunction::Count, ALL_ROWS)
    }

    /// Name of the column holding the aggregate in result tables.
    pub fn output_name(&self) -> &str {
        if self.field == ALL_ROWS {
            "count"
        } else {
            &self.field
        }
    }
}

/// Aggregation request against one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetQuery {
    pub dataset: String,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub aggregation: Aggregation,
}

impl DatasetQuery {
    pub fn new(dataset: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            dataset: dataset.into(),
            group_by: Vec::new(),
            filters: Vec::new(),
            aggregation,
        }
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by.push(field.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Every logical field the query reads, aggregation included.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        let aggregate = (self.aggregation.field != ALL_ROWS).then_some(self.aggregation.field.as_str());
        self.group_by
            .iter()
            .map(String::as_str)
            .chain(self.filters.iter().map(|f| f.field.as_str()))
            .chain(aggregate)
    }
}
