//! HTTP handlers for the REST API.
//!
//! Handlers only extract, dispatch to the analyzer registry or the
//! repository, and map the outcome to a status code.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use super::dto::{AnalyticsListResponse, DeferredResponse, HealthResponse, ImmediateResponse};
use super::error::AppError;
use super::state::AppState;
use crate::analyzers::AnalyticType;
use crate::api::{Analysis, Outcome, ResourceId};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Verify the service is running and the repository is reachable.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match state.repository.health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Analytics
// =============================================================================

/// GET /v1/analytics
pub async fn list_analytics(State(state): State<AppState>) -> HandlerResult<AnalyticsListResponse> {
    Ok(Json(AnalyticsListResponse {
        analytics: state
            .registry
            .analytics()
            .map(|analytic| analytic.to_string())
            .collect(),
    }))
}

/// POST /v1/analytics/{analytic}
///
/// The body is the request metadata. Immediate analytics answer with 200
/// and the result table; deferred ones answer with 202 and a link to poll.
pub async fn run_analytic(
    State(state): State<AppState>,
    Path(analytic): Path<String>,
    Json(metadata): Json<Value>,
) -> Result<Response, AppError> {
    let analytic: AnalyticType = analytic.parse().map_err(AppError::NotFound)?;
    let analyzer = state
        .registry
        .get(analytic)
        .ok_or_else(|| AppError::NotFound(format!("Analytic not available: {}", analytic)))?;

    let mut analysis = Analysis::pending(metadata);
    let response = match analyzer.analyze(&mut analysis).await? {
        Outcome::Immediate(result) => (
            StatusCode::OK,
            Json(ImmediateResponse {
                status: analysis.status,
                result,
            }),
        )
            .into_response(),
        Outcome::Deferred(resource_id) => (
            StatusCode::ACCEPTED,
            Json(DeferredResponse::new(resource_id, analysis.status)),
        )
            .into_response(),
    };
    Ok(response)
}

/// GET /v1/analytics/resource/{resource_id}
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> HandlerResult<Analysis> {
    let resource_id: ResourceId = resource_id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid resource id: {}", resource_id)))?;

    let analysis = state.repository.load_analysis(resource_id).await?;
    Ok(Json(analysis))
}
