use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sift_core::{DocId, DocumentRecord, Engine, EngineConfig, Error, IndexStats, NewDocument};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub title: String,
    pub source: String,
    pub snippet: String,
}

#[derive(Deserialize)]
pub struct SuggestParams {
    pub term: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Deserialize)]
pub struct IncomingDoc {
    pub title: String,
    pub source: String,
    #[serde(alias = "content")]
    pub body: String,
}

#[derive(Deserialize)]
pub struct BlacklistRequest {
    pub word: String,
}

#[derive(Serialize)]
pub struct DocSummary {
    pub doc_id: DocId,
    pub title: String,
    pub source: String,
    pub active: bool,
}

impl DocSummary {
    fn new(doc_id: DocId, doc: DocumentRecord) -> Self {
        Self { doc_id, title: doc.title, source: doc.source_reference, active: doc.active }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub admin_token: Option<String>,
}

type ApiError = (StatusCode, String);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        Error::DuplicateSource(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if err.is_storage_failure() {
        tracing::error!(error = %err, "storage failure");
    }
    (status, err.to_string())
}

impl AppState {
    /// Open the index at `index_dir`. A blank admin token disables the admin routes.
    pub fn open(
        index_dir: impl AsRef<std::path::Path>,
        config: EngineConfig,
        admin_token: Option<String>,
    ) -> Result<Self> {
        let engine = Engine::open(index_dir, config)?;
        let admin_token = admin_token.filter(|t| !t.trim().is_empty());
        Ok(Self { engine: Arc::new(engine), admin_token })
    }
}

pub fn build_router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/suggest", get(suggest_handler))
        .route("/stats", get(stats_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/doc/:doc_id/activate", post(activate_handler))
        .route("/doc/:doc_id/deactivate", post(deactivate_handler))
        .route("/docs", get(list_handler))
        .route("/index/batch", post(index_batch))
        .route("/blacklist", get(blacklist_list).post(blacklist_add))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let query = sift_core::Query::parse(&params.q).map_err(|e| api_error(e.into()))?;
    let ids = state.engine.run_active(&query).map_err(api_error)?;
    let terms = state.engine.highlight_terms(&query).map_err(api_error)?;

    let k = params.k.clamp(1, 100);
    let total_hits = ids.len();
    let mut results = Vec::with_capacity(k.min(total_hits));
    for doc_id in ids.into_iter().take(k) {
        let doc = state.engine.get_document(doc_id).map_err(api_error)?;
        results.push(SearchHit {
            doc_id,
            snippet: snippet(&doc.preview, &terms),
            title: doc.title,
            source: doc.source_reference,
        });
    }

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn suggest_handler(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    state.engine.suggest(&params.term).map(Json).map_err(api_error)
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
    state.engine.stats().map(Json).map_err(api_error)
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let doc = state.engine.get_document(doc_id).map_err(api_error)?;
    let text = state.engine.get_content(doc_id).map_err(api_error)?;
    Ok(Json(serde_json::json!({
        "doc_id": doc_id,
        "title": doc.title,
        "source": doc.source_reference,
        "active": doc.active,
        "preview": doc.preview,
        "text": text,
    })))
}

/// Cut the preview around the first highlighted term and wrap matches in `<em>`.
fn snippet(preview: &str, terms: &[String]) -> String {
    let lower = preview.to_lowercase();
    let first = terms.iter().filter_map(|t| lower.find(t.as_str())).min();
    let text: String = match first {
        // lowercasing can shift byte offsets for non-ASCII text; fall back to the head
        Some(idx) if lower.len() == preview.len() => {
            let start = floor_char_boundary(preview, idx.saturating_sub(100));
            let end = floor_char_boundary(preview, (idx + 200).min(preview.len()));
            preview[start..end].to_string()
        }
        _ => preview.chars().take(300).collect(),
    };
    highlight_terms(&text, terms)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&format!(r"\b{}\b", regex::escape(t)))
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

// --- Admin endpoints ---

async fn index_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(docs): Json<Vec<IncomingDoc>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let batch: Vec<NewDocument> =
        docs.into_iter().map(|d| NewDocument::new(d.title, d.source, d.body)).collect();
    let ids = state.engine.ingest_batch(&batch).map_err(api_error)?;
    Ok(Json(serde_json::json!({ "indexed": ids })))
}

async fn activate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    state.engine.activate(doc_id).map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deactivate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    state.engine.deactivate(doc_id).map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DocSummary>>, ApiError> {
    authorize(&state, &headers)?;
    let docs = match params.state.as_deref() {
        Some("active") => state.engine.list_active(),
        Some("inactive") => state.engine.list_inactive(),
        None | Some("all") => state.engine.list_documents(),
        Some(other) => return Err((StatusCode::BAD_REQUEST, format!("unknown state {other}"))),
    }
    .map_err(api_error)?;
    Ok(Json(docs.into_iter().map(|(id, doc)| DocSummary::new(id, doc)).collect()))
}

async fn blacklist_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, ApiError> {
    authorize(&state, &headers)?;
    state.engine.blacklist_list().map(Json).map_err(api_error)
}

async fn blacklist_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BlacklistRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let added = state.engine.blacklist_add(&req.word).map_err(api_error)?;
    Ok(Json(serde_json::json!({ "word": req.word.to_lowercase(), "added": added })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
