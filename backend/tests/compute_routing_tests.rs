//! Routing between precalc tables and on-the-fly computation, through the
//! built-in table catalogue.

mod support;

use land_analytics::analyzers::{
    AnalyticRequest, CarbonFluxRequest, TreeCoverLossRequest, TreeCoverRequest,
};
use land_analytics::api::AoiType;
use land_analytics::error::{AnalysisError, BuildError, ComputeError};
use serde_json::json;
use support::{engine, ids, tree_cover_rows, FakeColumnar, FakeRaster};

#[tokio::test]
async fn test_tree_cover_for_admin_uses_precalc_table() {
    let columnar = FakeColumnar::answering(tree_cover_rows());
    let raster = FakeRaster::returning(1.0);
    let engine = engine(columnar.clone(), raster.clone());

    let request = TreeCoverRequest::parse(&json!({
        "aoi": {"type": "admin", "ids": ["BRA", "IDN"]},
        "canopy_cover": 50
    }))
    .unwrap();

    let table = engine
        .compute(AoiType::Admin, &request.aoi.ids, &request.dataset_query())
        .await
        .unwrap();

    let calls = columnar.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "admin_tree_cover");
    assert!(calls[0].1.contains("umd_tree_cover_density_2000__threshold >= 50"));
    assert!(raster.datasets().is_empty());

    // Rows follow the requested AOI order.
    assert_eq!(
        table.column("aoi_id").unwrap(),
        &vec![json!("BRA"), json!("IDN")]
    );
    assert_eq!(
        table.column("area__ha").unwrap(),
        &vec![json!(480.25), json!(90.5)]
    );
}

#[tokio::test]
async fn test_unmapped_intersection_falls_back_to_otf() {
    let columnar = FakeColumnar::answering(tree_cover_rows());
    let raster = FakeRaster::returning(12.5);
    let engine = engine(columnar.clone(), raster.clone());

    let request = TreeCoverLossRequest::parse(&json!({
        "aoi": {"type": "admin", "ids": ["BRA"]},
        "intersections": ["natural_forest"]
    }))
    .unwrap();

    let table = engine
        .compute(AoiType::Admin, &request.aoi.ids, &request.dataset_query())
        .await
        .unwrap();

    assert!(columnar.calls().is_empty());
    assert_eq!(raster.datasets(), vec!["umd_tree_cover_loss"]);
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.column("natural_forest").unwrap(), &vec![json!(true)]);
    assert_eq!(table.column("area__ha").unwrap(), &vec![json!(12.5)]);
}

#[tokio::test]
async fn test_uncovered_aoi_type_falls_back_to_otf() {
    let columnar = FakeColumnar::answering(tree_cover_rows());
    let raster = FakeRaster::returning(3.0);
    let engine = engine(columnar.clone(), raster.clone());

    let request = TreeCoverLossRequest::parse(&json!({
        "aoi": {"type": "key_biodiversity_area", "ids": ["17", "42"]}
    }))
    .unwrap();

    let table = engine
        .compute(
            AoiType::KeyBiodiversityArea,
            &request.aoi.ids,
            &request.dataset_query(),
        )
        .await
        .unwrap();

    assert!(columnar.calls().is_empty());
    assert_eq!(raster.datasets().len(), 2);
    assert_eq!(
        table.column("aoi_id").unwrap(),
        &vec![json!("17"), json!("42")]
    );
    assert_eq!(
        table.column("aoi_type").unwrap(),
        &vec![json!("key_biodiversity_area"), json!("key_biodiversity_area")]
    );
}

#[tokio::test]
async fn test_dataset_without_table_uses_otf() {
    let columnar = FakeColumnar::answering(tree_cover_rows());
    let raster = FakeRaster::returning(-2.5);
    let engine = engine(columnar.clone(), raster.clone());

    let request = CarbonFluxRequest::parse(&json!({
        "aoi": {"type": "admin", "ids": ["BRA"]}
    }))
    .unwrap();

    let table = engine
        .compute(AoiType::Admin, &request.aoi.ids, &request.dataset_query())
        .await
        .unwrap();

    assert!(columnar.calls().is_empty());
    assert_eq!(raster.datasets(), vec!["gfw_forest_carbon_net_flux"]);
    assert_eq!(
        table.column("net_flux__Mg_CO2e").unwrap(),
        &vec![json!(-2.5)]
    );
}

#[tokio::test]
async fn test_otf_backend_failure_is_compute_error() {
    let engine = engine(
        FakeColumnar::answering(tree_cover_rows()),
        FakeRaster::failing(),
    );
    let request = CarbonFluxRequest::parse(&json!({
        "aoi": {"type": "admin", "ids": ["BRA"]}
    }))
    .unwrap();

    let err = engine
        .compute(AoiType::Admin, &request.aoi.ids, &request.dataset_query())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Compute(ComputeError::Backend { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_precalc_with_no_ids_fails_before_any_call() {
    let columnar = FakeColumnar::answering(tree_cover_rows());
    let engine = engine(columnar.clone(), FakeRaster::returning(0.0));
    let request = TreeCoverRequest::parse(&json!({
        "aoi": {"type": "admin", "ids": ["BRA"]}
    }))
    .unwrap();

    let err = engine
        .compute(AoiType::Admin, &ids(&[]), &request.dataset_query())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Build(BuildError::EmptyAoiIds)));
    assert!(columnar.calls().is_empty());
}

#[tokio::test]
async fn test_repeated_ids_collapse_on_both_paths() {
    let repeated = ids(&["BRA", "IDN", "BRA"]);
    let query = TreeCoverRequest::parse(&json!({
        "aoi": {"type": "admin", "ids": ["BRA"]}
    }))
    .unwrap()
    .dataset_query();

    let columnar = FakeColumnar::answering(tree_cover_rows());
    let precalc = engine(columnar.clone(), FakeRaster::returning(1.0))
        .compute(AoiType::Admin, &repeated, &query)
        .await
        .unwrap();
    assert_eq!(columnar.calls().len(), 1);
    assert!(columnar.calls()[0].1.contains("('BRA', 'IDN')"));
    assert_eq!(
        precalc.column("aoi_id").unwrap(),
        &vec![json!("BRA"), json!("IDN")]
    );

    let raster = FakeRaster::returning(1.0);
    let otf = engine(FakeColumnar::answering(tree_cover_rows()), raster.clone())
        .compute(AoiType::KeyBiodiversityArea, &repeated, &query)
        .await
        .unwrap();
    assert_eq!(raster.datasets().len(), 2);
    assert_eq!(
        otf.column("aoi_id").unwrap(),
        &vec![json!("BRA"), json!("IDN")]
    );
    assert_eq!(otf.row_count(), precalc.row_count());
}
