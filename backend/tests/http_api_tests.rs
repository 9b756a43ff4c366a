//! HTTP API behaviour against fake compute backends.

#![cfg(feature = "http-server")]

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use land_analytics::analyzers::AnalyzerRegistry;
use land_analytics::api::{Analysis, AnalysisStatus};
use land_analytics::db::repositories::LocalRepository;
use land_analytics::db::repository::AnalysisRepository;
use land_analytics::http::{create_router, AppState};
use land_analytics::services::JobTracker;
use serde_json::{json, Value};
use support::{engine, tree_cover_rows, wait_for_status, FakeColumnar, FakeRaster};
use tower::ServiceExt;

fn app(raster: Arc<FakeRaster>) -> (Router, LocalRepository) {
    let repo = LocalRepository::new();
    let repository: Arc<dyn AnalysisRepository> = Arc::new(repo.clone());
    let engine = Arc::new(engine(FakeColumnar::answering(tree_cover_rows()), raster));
    let registry = AnalyzerRegistry::with_defaults(engine, repository.clone(), JobTracker::new());
    (create_router(AppState::new(repository, registry)), repo)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_repository() {
    let (app, _repo) = app(FakeRaster::returning(1.0));
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_lists_analytics() {
    let (app, _repo) = app(FakeRaster::returning(1.0));
    let (status, body) = send(&app, get("/v1/analytics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["analytics"],
        json!(["tree_cover", "tree_cover_gain", "tree_cover_loss", "carbon_flux"])
    );
}

#[tokio::test]
async fn test_immediate_analytic_returns_result() {
    let (app, repo) = app(FakeRaster::returning(1.0));
    let (status, body) = send(
        &app,
        post(
            "/v1/analytics/tree_cover",
            json!({"aoi": {"type": "admin", "ids": ["BRA", "IDN"]}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    assert_eq!(body["result"]["aoi_id"], json!(["BRA", "IDN"]));
    assert_eq!(body["result"]["area__ha"], json!([480.25, 90.5]));
    assert_eq!(repo.store_count(), 0);
}

#[tokio::test]
async fn test_deferred_analytic_can_be_polled() {
    let (app, repo) = app(FakeRaster::returning(-3.0));
    let (status, body) = send(
        &app,
        post(
            "/v1/analytics/carbon-flux",
            json!({"aoi": {"type": "protected_area", "ids": ["555"]}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let resource_id: uuid::Uuid = serde_json::from_value(body["resource_id"].clone()).unwrap();
    let link = body["link"].as_str().unwrap().to_string();
    assert_eq!(link, format!("/v1/analytics/resource/{}", resource_id));

    wait_for_status(&repo, resource_id, AnalysisStatus::Complete).await;

    let (status, body) = send(&app, get(&link)).await;
    assert_eq!(status, StatusCode::OK);
    let analysis: Analysis = serde_json::from_value(body).unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Complete);
    assert_eq!(analysis.metadata["analytic"], "carbon_flux");
    assert_eq!(
        analysis.result.column("net_flux__Mg_CO2e").unwrap(),
        &vec![json!(-3.0)]
    );
}

#[tokio::test]
async fn test_unknown_analytic_is_not_found() {
    let (app, _repo) = app(FakeRaster::returning(1.0));
    let (status, body) = send(
        &app,
        post(
            "/v1/analytics/land_use",
            json!({"aoi": {"type": "admin", "ids": ["BRA"]}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_request_is_bad_request() {
    let (app, repo) = app(FakeRaster::returning(1.0));
    let (status, body) = send(
        &app,
        post(
            "/v1/analytics/tree_cover_loss",
            json!({"aoi": {"type": "admin", "ids": ["BRA"]}, "canopy_cover": 33}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"], "field: canopy_cover");
    assert_eq!(repo.store_count(), 0);
}

#[tokio::test]
async fn test_compute_failure_is_bad_gateway() {
    let (app, _repo) = app(FakeRaster::failing());
    // Protected areas have no gain table, so this goes to the raster service.
    let (status, body) = send(
        &app,
        post(
            "/v1/analytics/tree_cover_gain",
            json!({"aoi": {"type": "protected_area", "ids": ["555"]}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "COMPUTE_ERROR");
}

#[tokio::test]
async fn test_resource_lookup_errors() {
    let (app, _repo) = app(FakeRaster::returning(1.0));

    let (status, _) = send(&app, get("/v1/analytics/resource/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let (status, body) = send(&app, get(&format!("/v1/analytics/resource/{}", missing))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
