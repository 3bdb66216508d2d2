use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sift_core::{Engine, EngineConfig, NewDocument};
use sift_server::{build_router, AppState};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const TOKEN: &str = "secret";

fn build_tiny_index() -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    engine
        .ingest_batch(&[
            NewDocument::new("Doc 1", "doc1.txt", "Rust is great. rust systems programming."),
            NewDocument::new("Doc 2", "doc2.txt", "Learning rust and go."),
            NewDocument::new("Doc 3", "doc3.txt", "Go is simple."),
        ])
        .unwrap();
    let state = AppState { engine: Arc::new(engine), admin_token: Some(TOKEN.into()) };
    (dir, build_router(state))
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into()));
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn admin_post(uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::post(uri).header("X-ADMIN-TOKEN", TOKEN);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn ids(json: &Value) -> Vec<u64> {
    json["results"].as_array().unwrap().iter().map(|h| h["doc_id"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (_dir, app) = build_tiny_index();
    let (status, json) = call(&app, get("/search?q=rust&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    assert_eq!(ids(&json), vec![1, 2]);
    assert!(json["results"][0]["snippet"].as_str().unwrap().contains("<em>Rust</em>"));
}

#[tokio::test]
async fn boolean_query_over_http() {
    let (_dir, app) = build_tiny_index();
    let (status, json) = call(&app, get("/search?q=go%20not%20rust")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![3]);
}

#[tokio::test]
async fn invalid_query_is_bad_request() {
    let (_dir, app) = build_tiny_index();
    let (status, _) = call(&app, get("/search?q=rust%20and")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deeply_nested_query_is_bad_request() {
    let (_dir, app) = build_tiny_index();
    let q = format!("{}rust{}", "%28".repeat(2_000), "%29".repeat(2_000));
    let (status, json) = call(&app, get(&format!("/search?q={q}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.as_str().unwrap().contains("nests deeper"));
}

#[tokio::test]
async fn deactivated_documents_leave_results() {
    let (_dir, app) = build_tiny_index();
    let (status, _) = call(&app, get("/doc/1/deactivate")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call(&app, admin_post("/doc/1/deactivate", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, json) = call(&app, get("/search?q=rust")).await;
    assert_eq!(ids(&json), vec![2]);

    let (status, _) = call(&app, admin_post("/doc/1/activate", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, json) = call(&app, get("/search?q=rust")).await;
    assert_eq!(ids(&json), vec![1, 2]);

    let (status, _) = call(&app, admin_post("/doc/77/activate", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let (_dir, app) = build_tiny_index();
    let req = Request::post("/blacklist")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"word":"go"}"#))
        .unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blacklist_and_quoted_override() {
    let (_dir, app) = build_tiny_index();
    let (status, json) = call(&app, admin_post("/blacklist", Some(serde_json::json!({"word": "Go"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["added"], true);

    let (_, json) = call(&app, get("/search?q=go")).await;
    assert_eq!(json["total_hits"], 0);
    let (_, json) = call(&app, get("/search?q=%22go%22")).await;
    assert_eq!(ids(&json), vec![2, 3]);
}

#[tokio::test]
async fn batch_ingestion_and_duplicates() {
    let (_dir, app) = build_tiny_index();
    let docs = serde_json::json!([{ "title": "New", "source": "new.txt", "body": "fresh content" }]);
    let (status, json) = call(&app, admin_post("/index/batch", Some(docs.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["indexed"], serde_json::json!([4]));

    let (status, _) = call(&app, admin_post("/index/batch", Some(docs))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = call(&app, get("/doc/4")).await;
    assert_eq!(json["title"], "New");
    assert_eq!(json["text"], "fresh content");
}

#[tokio::test]
async fn suggest_and_missing_doc() {
    let (_dir, app) = build_tiny_index();
    let (status, json) = call(&app, get("/suggest?term=rusy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0], "rust");

    let (status, _) = call(&app, get("/doc/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
