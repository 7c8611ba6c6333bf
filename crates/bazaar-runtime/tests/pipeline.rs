//! End-to-end runs: snapshot replay and a full crawl against a fake upstream.

use std::collections::HashMap;
use std::path::Path as FsPath;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use bazaar_core::{PipelineConfig, ProductId};
use bazaar_runtime::snapshot::RawRecords;
use bazaar_runtime::{Orchestrator, RunSource, SnapshotKind, SnapshotStore, StreamReport};
use bazaar_store::SqliteStore;
use serde_json::{json, Value};

fn product_payload(id: i64, title: Option<&str>) -> Value {
    let mut payload = json!({
        "id": id,
        "title_fa": "گوشی",
        "brand": {"code": "alpha"},
        "category": {"code": "mobile-phone"},
        "specifications": [
            {"title": "General", "attributes": [
                {"title": "Weight", "values": ["180 grams"]},
                {"title": "Release date", "values": ["2023"]}
            ]}
        ],
        "colors": [{"title": "black"}],
        "rating": {"rate": 4, "count": 12},
        "default_variant": {"price": {"selling_price": 1_000 * id}},
        "images": {"main": {"url": ["main.jpg"]}, "list": []}
    });
    if let Some(title) = title {
        payload["title_en"] = json!(title);
    }
    payload
}

fn config(root: &FsPath) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.store.db_path = root.join("bazaar.db");
    config.snapshot_dir = root.join("snapshots");
    config.chunk_size = 2;
    config.concurrency = 4;
    config.request_timeout_secs = 5;
    config.collect_deadline_secs = 10;
    config.workers = Some(2);
    config
}

fn completed(outcome: &bazaar_runtime::StreamOutcome) -> &StreamReport {
    outcome.report().unwrap()
}

// ---------------------------------------------------------------------------
// Snapshot replay
// ---------------------------------------------------------------------------

fn write_snapshots(dir: &FsPath) {
    let snapshots = SnapshotStore::new(dir);

    let mut products = RawRecords::new();
    products.insert(
        "1".into(),
        vec![
            product_payload(1, Some("One")),
            product_payload(2, Some("Two")),
            product_payload(3, None),
            product_payload(4, Some("Four")),
        ],
    );
    products.insert(
        "2".into(),
        vec![product_payload(5, Some("Five")), product_payload(6, Some("Six"))],
    );

    let mut comments = RawRecords::new();
    comments.insert(
        "1".into(),
        vec![json!({"body": "great", "rate": 5}), json!({"body": "fine"})],
    );
    comments.insert("2".into(), vec![json!({"body": "ok"}), json!({"body": "   "})]);

    // An older products file that must not be picked.
    snapshots
        .write("2024-01-01_00-00-00", SnapshotKind::Products, &RawRecords::new())
        .unwrap();
    snapshots
        .write("2025-06-01_12-00-00", SnapshotKind::Products, &products)
        .unwrap();
    snapshots
        .write("2025-06-01_12-00-00", SnapshotKind::Comments, &comments)
        .unwrap();

    // A newer run that only got as far as its products file.
    let mut partial = RawRecords::new();
    partial.insert("9".into(), vec![product_payload(99, Some("Orphan"))]);
    snapshots
        .write("2025-07-01_00-00-00", SnapshotKind::Products, &partial)
        .unwrap();
}

#[tokio::test]
async fn test_snapshot_replay_loads_chunks_independently() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.skip_crawl = true;
    write_snapshots(&config.snapshot_dir);

    let report = Orchestrator::new(config.clone()).run().await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.source, RunSource::Snapshot);
    assert!(report.discovery.is_none());

    // 6 products in chunks of 2; product 3 lacks title_en.
    let catalog = completed(&report.catalog);
    assert_eq!(catalog.records, 6);
    assert_eq!(catalog.chunks, 3);
    assert_eq!(catalog.transformed, 5);
    assert_eq!(catalog.skipped, 1);
    assert_eq!(catalog.persisted, 5);
    assert_eq!(catalog.failed, 0);

    let reviews = completed(&report.reviews);
    assert_eq!(reviews.records, 4);
    assert_eq!(reviews.transformed, 3);
    assert_eq!(reviews.persisted, 3);

    let store = SqliteStore::open(&config.store).unwrap();
    assert_eq!(store.count_products().unwrap(), 5);
    assert_eq!(store.count_comments().unwrap(), 3);
    assert!(store.get_product(&ProductId::from(99)).unwrap().is_none());
    let p3 = ProductId::from(3);
    assert!(store.get_product(&p3).unwrap().is_none());
    let p6 = store.get_product(&ProductId::from(6)).unwrap().unwrap();
    assert_eq!(p6.price, Some(6_000));
    store.close().unwrap();
}

#[tokio::test]
async fn test_replaying_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.skip_crawl = true;
    write_snapshots(&config.snapshot_dir);

    Orchestrator::new(config.clone()).run().await.unwrap();
    let store = SqliteStore::open(&config.store).unwrap();
    let before = store.get_product_row(&ProductId::from(1)).unwrap().unwrap();
    store.close().unwrap();

    let second = Orchestrator::new(config.clone()).run().await.unwrap();
    assert_eq!(completed(&second.catalog).persisted, 5);

    let store = SqliteStore::open(&config.store).unwrap();
    assert_eq!(store.count_products().unwrap(), 5);
    // Comments are replaced per product, not appended.
    assert_eq!(store.count_comments().unwrap(), 3);
    let after = store.get_product_row(&ProductId::from(1)).unwrap().unwrap();
    assert_eq!(before, after);
    store.close().unwrap();
}

// ---------------------------------------------------------------------------
// Full crawl
// ---------------------------------------------------------------------------

async fn catalog(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let Some(brand) = q.get("brand[0]") else {
        return Json(json!({"data": {"filters": {"brands": {"options": [
            {"id": 1, "code": "alpha"},
            {"id": 2, "code": "beta"}
        ]}}}}));
    };
    let (total_pages, ids): (u32, Vec<i64>) = match brand.as_str() {
        "1" => (1, vec![101, 102]),
        "2" => (1, vec![103]),
        _ => (0, vec![]),
    };
    let products: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    Json(json!({"data": {"pager": {"total_pages": total_pages}, "products": products}}))
}

async fn product(Path(id): Path<i64>) -> Result<Json<Value>, StatusCode> {
    if id == 103 {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(json!({"data": {"product": product_payload(id, Some("Phone"))}})))
}

async fn comments(
    Path(id): Path<i64>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let page: u32 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let total_pages = if id == 101 { 2 } else { 1 };
    Json(json!({"data": {
        "pager": {"total_pages": total_pages},
        "comments": [{"body": format!("page {} of {}", page, id), "rate": 4}]
    }}))
}

async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/catalog/", get(catalog))
        .route("/product/{id}/", get(product))
        .route("/comments/{id}/", get(comments));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_full_crawl_against_fake_upstream() {
    let base = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.catalog_url = format!("{}/catalog/", base);
    config.product_url = format!("{}/product/", base);
    config.comments_url = format!("{}/comments/", base);

    let report = Orchestrator::new(config.clone()).run().await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.source, RunSource::Crawl);
    assert_eq!(report.discovery.unwrap().failed, 0);

    let catalog = completed(&report.catalog);
    assert_eq!(catalog.records, 2);
    assert_eq!(catalog.persisted, 2);
    let crawl = catalog.crawl.unwrap();
    assert_eq!(crawl.succeeded, 2);
    assert_eq!(crawl.failed, 1);

    // 101 has two review pages, 102 and 103 one each.
    let reviews = completed(&report.reviews);
    assert_eq!(reviews.records, 4);
    assert_eq!(reviews.persisted, 4);

    let store = SqliteStore::open(&config.store).unwrap();
    assert_eq!(store.count_products().unwrap(), 2);
    assert_eq!(store.comments_for_product(&ProductId::from(101)).unwrap().len(), 2);
    assert_eq!(store.count_comments_for(&[ProductId::from(103)]).unwrap(), 1);
    store.close().unwrap();

    let snapshots = SnapshotStore::new(&config.snapshot_dir);
    for kind in [SnapshotKind::Brands, SnapshotKind::Products, SnapshotKind::Comments] {
        assert!(snapshots.latest(kind).unwrap().is_some());
    }
    let (_, products) = snapshots.read_latest(SnapshotKind::Products).unwrap();
    assert_eq!(products["1"].len(), 2);
    assert!(products["2"].is_empty());
}
