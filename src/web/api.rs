use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::review::{ReviewSettings, review_pr};
use crate::bookmarks::{Bookmarks, RESERVED_KEYS, Target, expand_direct, expand_search, to_location};
use crate::errors::{ExpandError, SpawnError, ValidationError};
use crate::relay::render::escape_html;

/// Bookmark matches returned per suggestion request.
pub const MAX_SUGGESTIONS: usize = 10;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub bookmarks: Bookmarks,
    pub review: ReviewSettings,
    /// Prefix for absolute links, without a trailing slash
    pub base_url: String,
}

pub type SharedState = Arc<AppState>;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct ListEntry<'a> {
    pub key: &'a str,
    pub description: &'a str,
    pub url: &'a str,
    pub params: Vec<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub count: usize,
    pub hash: String,
}

// ── Error handling ────────────────────────────────────────────────────

/// Errors from the `/api/*` routes, rendered as `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    fn parts(self) -> (StatusCode, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.parts();
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ExpandError> for ApiError {
    fn from(err: ExpandError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<SpawnError> for ApiError {
    fn from(err: SpawnError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// The same errors for browser-facing routes, as a plain-text body.
#[derive(Debug)]
pub struct PageError(pub ApiError);

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = self.0.parts();
        (status, format!("Error: {}", message)).into_response()
    }
}

impl From<ApiError> for PageError {
    fn from(err: ApiError) -> Self {
        PageError(err)
    }
}

impl From<ValidationError> for PageError {
    fn from(err: ValidationError) -> Self {
        PageError(err.into())
    }
}

impl From<ExpandError> for PageError {
    fn from(err: ExpandError) -> Self {
        PageError(err.into())
    }
}

impl From<SpawnError> for PageError {
    fn from(err: SpawnError) -> Self {
        PageError(err.into())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/search/", get(search_redirect))
        .route("/list/", get(list_bookmarks))
        .route("/review-pr/", get(review_pr))
        .route("/api/status/", get(bookmark_status))
        .route("/api/suggestions/", get(search_suggestions))
        .route("/health", get(health_check))
        .route("/{key}/", get(redirect_bookmark))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// 302 to `url`, or a copy-paste page for URLs browsers won't follow.
fn target_response(target: Target) -> Response {
    match target {
        Target::Redirect(url) => {
            let location = to_location(&url);
            match HeaderValue::from_str(&location) {
                Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
                Err(_) => PageError(ApiError::BadRequest(format!(
                    "Cannot redirect to '{}'",
                    url
                )))
                .into_response(),
            }
        }
        Target::BrowserOnly(url) => browser_only_page(&url).into_response(),
    }
}

fn browser_only_page(url: &str) -> Html<String> {
    let url = escape_html(url);
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Open in browser</title></head>\n\
         <body>\n<p>Browsers do not allow web pages to open this address.</p>\n\
         <p>Copy it into the address bar:</p>\n<pre><code>{url}</code></pre>\n</body>\n</html>\n"
    ))
}

fn no_cache<R: IntoResponse>(body: R) -> Response {
    let mut response = body.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

/// `GET /search/?q=<key> <params...>`
async fn search_redirect(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, PageError> {
    let query = query.q.unwrap_or_default();
    let query = query.trim();
    info!(query, "search redirect");
    if query.is_empty() {
        return Err(ApiError::NotFound("No search query provided".into()).into());
    }

    let (key, rest) = query
        .split_once(char::is_whitespace)
        .unwrap_or((query, ""));
    if RESERVED_KEYS.contains(&key) {
        return Ok(target_response(Target::Redirect("/list/".into())));
    }

    let store = state.bookmarks.snapshot().await;
    let Some(bookmark) = store.get(key) else {
        warn!(key, "bookmark not found");
        return Err(ApiError::NotFound(format!("Bookmark '{}' not found", key)).into());
    };
    let url = expand_search(bookmark, rest)?;
    debug!(key, %url, "expanded bookmark");
    Ok(target_response(Target::classify(url)))
}

/// `GET /<key>/?<param>=<value>...`
async fn redirect_bookmark(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, PageError> {
    info!(%key, "direct redirect");
    let store = state.bookmarks.snapshot().await;
    let Some(bookmark) = store.get(&key) else {
        warn!(%key, "bookmark not found");
        return Err(ApiError::NotFound(format!("Bookmark '{}' not found", key)).into());
    };
    let url = expand_direct(bookmark, |name| params.get(name).map(String::as_str))?;
    Ok(target_response(Target::classify(url)))
}

async fn list_bookmarks(State(state): State<SharedState>) -> Response {
    let store = state.bookmarks.snapshot().await;
    let entries: Vec<ListEntry<'_>> = store
        .iter()
        .map(|b| ListEntry {
            key: &b.key,
            description: &b.description,
            url: &b.url,
            params: b.params(),
        })
        .collect();
    no_cache(Json(entries))
}

async fn bookmark_status(State(state): State<SharedState>) -> Response {
    let store = state.bookmarks.snapshot().await;
    no_cache(Json(StatusResponse {
        count: store.len(),
        hash: store.content_hash(),
    }))
}

/// OpenSearch suggestions: `[query, completions, descriptions, urls]`.
async fn search_suggestions(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let query = query.q.unwrap_or_default().trim().to_lowercase();
    let mut completions = Vec::new();
    let mut descriptions = Vec::new();
    let mut urls = Vec::new();

    if let Some(term) = query.split_whitespace().next() {
        if "help".starts_with(term) || "h".starts_with(term) {
            completions.push("h".to_string());
            descriptions.push("Show all bookmarks".to_string());
            urls.push(format!("{}/list/", state.base_url));
        }

        let store = state.bookmarks.snapshot().await;
        for bookmark in store.suggest(term, MAX_SUGGESTIONS) {
            completions.push(bookmark.key.clone());
            descriptions.push(if bookmark.description.is_empty() {
                format!("Redirect to {}", bookmark.url)
            } else {
                bookmark.description.clone()
            });
            urls.push(format!("{}/{}/", state.base_url, bookmark.key));
        }
        debug!(%query, results = completions.len(), "search suggestions");
    }

    no_cache(Json(serde_json::json!([query, completions, descriptions, urls])))
}
