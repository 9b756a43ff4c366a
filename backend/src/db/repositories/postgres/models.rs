use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use super::schema::analyses;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = analyses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // updated_at is only read by operators
pub struct AnalysisRow {
    pub resource_id: String,
    pub metadata: Value,
    pub result: Value,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = analyses)]
pub struct NewAnalysisRow {
    pub resource_id: String,
    pub metadata: Value,
    pub result: Value,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}
