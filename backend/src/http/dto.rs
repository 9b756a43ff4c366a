//! Data Transfer Objects for the HTTP API.
//!
//! Stored analyses are returned as [`Analysis`](crate::api::Analysis)
//! directly; these types cover the remaining responses.

use serde::{Deserialize, Serialize};

use crate::api::{AnalysisStatus, ResourceId, ResultTable};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Analytics the service can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsListResponse {
    pub analytics: Vec<String>,
}

/// Result computed within the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateResponse {
    pub status: AnalysisStatus,
    pub result: ResultTable,
}

/// Accepted job; poll `link` for the stored analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredResponse {
    pub resource_id: ResourceId,
    pub status: AnalysisStatus,
    pub link: String,
}

impl DeferredResponse {
    pub fn new(resource_id: ResourceId, status: AnalysisStatus) -> Self {
        Self {
            resource_id,
            status,
            link: resource_link(resource_id),
        }
    }
}

/// Path of the stored analysis.
pub fn resource_link(resource_id: ResourceId) -> String {
    format!("/v1/analytics/resource/{}", resource_id)
}
