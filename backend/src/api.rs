//! Public domain types shared by the analyzers, the compute engine and the
//! persistence layer.
//!
//! All types derive Serialize/Deserialize so they can be persisted as JSON
//! and returned unchanged by the HTTP layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Column carrying the AOI identifier in every result table.
pub const AOI_ID_COLUMN: &str = "aoi_id";
/// Column carrying the AOI type in every result table.
pub const AOI_TYPE_COLUMN: &str = "aoi_type";

/// Identifier under which an [`Analysis`] is stored (its fingerprint).
pub type ResourceId = Uuid;

/// Kind of area an AOI identifier refers to.
///
/// The identifier format for each kind is validated upstream; here the
/// pairing is consumed as a precondition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AoiType {
    /// Administrative boundary (country, region, subregion GIDs).
    Admin,
    /// WDPA protected area.
    ProtectedArea,
    /// Key biodiversity area.
    KeyBiodiversityArea,
    /// Indigenous and community land.
    IndigenousLand,
}

impl AoiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AoiType::Admin => "admin",
            AoiType::ProtectedArea => "protected_area",
            AoiType::KeyBiodiversityArea => "key_biodiversity_area",
            AoiType::IndigenousLand => "indigenous_land",
        }
    }
}

impl fmt::Display for AoiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AoiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "protected_area" => Ok(Self::ProtectedArea),
            "key_biodiversity_area" => Ok(Self::KeyBiodiversityArea),
            "indigenous_land" => Ok(Self::IndigenousLand),
            _ => Err(format!("Unknown AOI type: {}", s)),
        }
    }
}

/// A typed set of region identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaOfInterest {
    #[serde(rename = "type")]
    pub aoi_type: AoiType,
    pub ids: Vec<String>,
}

impl AreaOfInterest {
    pub fn new(aoi_type: AoiType, ids: Vec<String>) -> Self {
        Self { aoi_type, ids }
    }

    /// Drop repeated ids, keeping the first occurrence of each.
    pub fn dedup_ids(&mut self) {
        self.ids = unique_ids(&self.ids);
    }
}

/// `ids` without repeats, in first-seen order.
pub fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(id.as_str()) {
            unique.push(id.clone());
        }
    }
    unique
}

/// Text form of an `aoi_id` cell as returned by a backend.
///
/// Numeric ids (e.g. WDPA ids) compare equal to their decimal text.
pub fn aoi_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lifecycle state of an analysis job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Complete,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Complete => "complete",
            AnalysisStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown analysis status: {}", s)),
        }
    }
}

/// Columnar result mapping: output field name to one value per row.
///
/// Every table produced by a compute handler carries [`AOI_ID_COLUMN`] and
/// [`AOI_TYPE_COLUMN`] plus one column per requested field, all of equal
/// length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTable(BTreeMap<String, Vec<Value>>);

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table with the given columns.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            columns
                .into_iter()
                .map(|c| (c.into(), Vec::new()))
                .collect(),
        )
    }

    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.0.insert(name.into(), values);
    }

    pub fn column(&self, name: &str) -> Option<&Vec<Value>> {
        self.0.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Append one value to a column, creating it when missing.
    pub fn push(&mut self, column: &str, value: Value) {
        self.0.entry(column.to_string()).or_default().push(value);
    }

    /// Number of rows, taken from the `aoi_id` column when present.
    pub fn row_count(&self) -> usize {
        self.0
            .get(AOI_ID_COLUMN)
            .or_else(|| self.0.values().next())
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every column has the same number of values.
    pub fn is_rectangular(&self) -> bool {
        let mut lengths = self.0.values().map(Vec::len);
        match lengths.next() {
            Some(first) => lengths.all(|len| len == first),
            None => true,
        }
    }

    /// Rename a column in place. Missing columns are ignored.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(values) = self.0.remove(from) {
            self.0.insert(to.to_string(), values);
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<Value>> {
        self.0
    }
}

impl From<BTreeMap<String, Vec<Value>>> for ResultTable {
    fn from(map: BTreeMap<String, Vec<Value>>) -> Self {
        Self(map)
    }
}

/// One analytic job.
///
/// `metadata` holds the normalized request; `result` is empty until the
/// job completes. Equality is structural over all three fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub metadata: Value,
    #[serde(default)]
    pub result: ResultTable,
    pub status: AnalysisStatus,
}

impl Analysis {
    /// A freshly accepted request.
    pub fn pending(metadata: Value) -> Self {
        Self {
            metadata,
            result: ResultTable::new(),
            status: AnalysisStatus::Pending,
        }
    }

    pub fn complete(metadata: Value, result: ResultTable) -> Self {
        Self {
            metadata,
            result,
            status: AnalysisStatus::Complete,
        }
    }

    pub fn failed(metadata: Value) -> Self {
        Self {
            metadata,
            result: ResultTable::new(),
            status: AnalysisStatus::Failed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == AnalysisStatus::Pending
    }
}

/// What an analyzer hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The result was computed during the call.
    Immediate(ResultTable),
    /// The job was accepted; poll the repository under this id.
    Deferred(ResourceId),
}

impl Outcome {
    pub fn resource_id(&self) -> Option<ResourceId> {
        match self {
            Outcome::Deferred(id) => Some(*id),
            Outcome::Immediate(_) => None,
        }
    }
}
