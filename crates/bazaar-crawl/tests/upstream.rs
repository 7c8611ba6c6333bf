//! Discovery and collection against a local fake of the upstream API.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use bazaar_core::ProductId;
use bazaar_crawl::{
    CatalogJob, CrawlJob, FanoutSettings, FetchClient, FetchError, Parent, Resolver, ReviewJob,
};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

async fn catalog(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let Some(brand) = q.get("brand[0]") else {
        return Json(json!({"data": {"filters": {"brands": {"options": [
            {"id": 1, "code": "alpha"},
            {"id": 2, "code": "beta"},
            {"id": 3, "code": "gamma"}
        ]}}}}));
    };
    let page: u32 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let (total_pages, ids): (u32, Vec<i64>) = match (brand.as_str(), page) {
        ("1", 1) => (2, vec![101, 102]),
        ("1", 2) => (2, vec![103]),
        ("2", _) => (1, vec![201, 102]),
        _ => (0, vec![]),
    };
    let products: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    Json(json!({"data": {"pager": {"total_pages": total_pages}, "products": products}}))
}

async fn product(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if id == "201" {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({"data": {"product": {"id": id.parse::<i64>().unwrap(), "title_en": "P"}}})))
}

async fn comments(
    Path(id): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let page: u32 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let total_pages = if id == "101" { 2 } else { 1 };
    let body = format!("comment {} on {}", page, id);
    Json(json!({"data": {
        "pager": {"total_pages": total_pages},
        "comments": [{"body": body}]
    }}))
}

async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/catalog/", get(catalog))
        .route("/product/{id}/", get(product))
        .route("/comments/{id}/", get(comments))
        .route("/broken/", get(|| async { "not json" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client() -> FetchClient {
    FetchClient::new(Arc::new(Semaphore::new(5)), Duration::from_secs(5), "bazaar-test").unwrap()
}

fn settings() -> FanoutSettings {
    FanoutSettings {
        concurrency: 5,
        deadline: Duration::from_secs(10),
    }
}

fn job(base: &str) -> CatalogJob {
    CatalogJob {
        catalog_url: format!("{}/catalog/", base),
        category_url: None,
        product_url: format!("{}/product/", base),
        in_stock_only: true,
    }
}

fn ids(raw: &[i64]) -> BTreeSet<ProductId> {
    raw.iter().map(|&i| ProductId::from(i)).collect()
}

#[tokio::test]
async fn test_discovery_builds_index_with_empty_parent() {
    let base = spawn_upstream().await;
    let resolver = Resolver::new(client(), job(&base), settings());

    let brands = resolver.list_brands().await;
    assert_eq!(brands.len(), 3);

    assert_eq!(resolver.probe_total_pages(&Parent::Brand(1)).await, 2);
    assert_eq!(resolver.probe_total_pages(&Parent::Brand(3)).await, 0);

    let parents = resolver.list_parents().await;
    let (index, stats) = resolver.resolve_product_ids(parents).await;

    assert_eq!(index.0["1"], ids(&[101, 102, 103]));
    assert_eq!(index.0["2"], ids(&[102, 201]));
    assert!(index.0["3"].is_empty());
    assert_eq!(index.product_count(), 4);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.abandoned, 0);
}

#[tokio::test]
async fn test_catalog_and_review_collection() {
    let base = spawn_upstream().await;
    let client = client();
    let resolver = Resolver::new(client.clone(), job(&base), settings());
    let (index, _) = resolver.resolve_product_ids(resolver.list_parents().await).await;

    let catalog = CrawlJob::Catalog(job(&base))
        .collect(&client, settings(), &index)
        .await;
    assert_eq!(catalog.records["1"].len(), 3);
    // 102 is listed by both brands but fetched once, under the first.
    assert!(catalog.records["2"].is_empty());
    assert!(catalog.records["3"].is_empty());
    assert_eq!(catalog.stats.succeeded, 3);
    assert_eq!(catalog.stats.failed, 1);

    let reviews = CrawlJob::Review(ReviewJob {
        comments_url: format!("{}/comments/", base),
    })
    .collect(&client, settings(), &index)
    .await;
    assert_eq!(reviews.records["101"].len(), 2);
    assert_eq!(reviews.records["201"].len(), 1);
    assert_eq!(reviews.record_count(), 5);
    assert_eq!(reviews.stats.failed, 0);
}

#[tokio::test]
async fn test_failure_classes() {
    let base = spawn_upstream().await;
    let client = client();

    let err = client
        .fetch_json(&format!("{}/product/201/", base))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Status(500));

    let err = client
        .fetch_json(&format!("{}/broken/", base))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));

    let err = client
        .fetch::<bazaar_crawl::api::Envelope<bazaar_crawl::api::ListingPage>>(&format!(
            "{}/product/101/",
            base
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Shape(_)));
}

// ---------------------------------------------------------------------------
// Category mode
// ---------------------------------------------------------------------------

type Hits = Arc<Mutex<HashMap<(String, u32), usize>>>;

async fn category_home() -> Json<Value> {
    Json(json!({"data": {"widgets": [
        {"type": "banner", "data": {}},
        {"data": {"categories": [{"code": "dairy"}, {"code": "bakery"}, {"code": "drinks"}]}}
    ]}}))
}

async fn category_search(
    State(hits): State<Hits>,
    Path(code): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let page: u32 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    *hits.lock().unwrap().entry((code.clone(), page)).or_default() += 1;
    let (total_pages, ids): (u32, Vec<i64>) = match (code.as_str(), page) {
        ("dairy", 1) => (2, vec![11, 12]),
        ("dairy", 2) => (2, vec![13]),
        ("bakery", _) => (1, vec![14]),
        _ => (0, vec![]),
    };
    let products: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    Json(json!({"data": {"pager": {"total_pages": total_pages}, "products": products}}))
}

async fn spawn_category_upstream(hits: Hits) -> String {
    let app = Router::new()
        .route("/shop", get(category_home))
        .route("/shop/categories/{code}/search/", get(category_search))
        .with_state(hits);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_category_discovery_fetches_each_page_once() {
    let hits: Hits = Arc::default();
    let base = spawn_category_upstream(hits.clone()).await;
    let mut category_job = job(&base);
    category_job.category_url = Some(format!("{}/shop", base));
    let resolver = Resolver::new(client(), category_job, settings());

    let parents = resolver.list_parents().await;
    assert_eq!(
        parents,
        vec![
            Parent::Category("dairy".into()),
            Parent::Category("bakery".into()),
            Parent::Category("drinks".into()),
        ]
    );

    let (index, stats) = resolver.resolve_product_ids(parents).await;
    assert_eq!(index.0["dairy"], ids(&[11, 12, 13]));
    assert_eq!(index.0["bakery"], ids(&[14]));
    assert!(index.0["drinks"].is_empty());
    assert_eq!(index.parent_count(), 3);
    assert_eq!(stats.failed, 0);
    // Three first pages plus dairy's second.
    assert_eq!(stats.succeeded, 4);

    let hits = hits.lock().unwrap();
    assert_eq!(hits.len(), 4);
    assert!(hits.values().all(|&n| n == 1), "{:?}", hits);
}
