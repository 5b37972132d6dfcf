use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::store::{ArticleStore, FeedPageQuery, FeedRow};
use crate::types::{to_iso8601, PipelineError, FEED_CATEGORIES};

pub const MIN_PAGE_SIZE: i64 = 1;
pub const MAX_PAGE_SIZE: i64 = 50;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Client-facing error: a status code and a reason, rendered as JSON.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ArticleNotFound { id } => {
                Self::not_found(format!("Article not found: {}", id))
            }
            other => {
                error!("Request failed: {}", other);
                Self::internal("Internal server error")
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourceItem {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ArticleItem {
    pub id: String,
    pub title: String,
    pub category: String,
    pub primary_category: Option<String>,
    pub published_at: String,
    pub summary: Option<String>,
    pub source: SourceItem,
    pub original_url: String,
}

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub items: Vec<ArticleItem>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryList {
    pub items: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceList {
    pub items: Vec<SourceItem>,
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub sources: Option<String>,
}

pub fn router(store: Arc<ArticleStore>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/feed", get(feed))
        .route("/v1/feed/{category}", get(feed_by_category))
        .route("/v1/articles/{id}", get(article_by_id))
        .route("/v1/categories", get(categories))
        .route("/v1/sources", get(sources))
        .with_state(store)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn feed(
    State(store): State<Arc<ArticleStore>>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedPage>, ApiError> {
    let page = feed_page(&store, None, &params).await?;
    Ok(Json(page))
}

async fn feed_by_category(
    State(store): State<Arc<ArticleStore>>,
    Path(category): Path<String>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedPage>, ApiError> {
    check_feed_category(&category)?;

    let page = feed_page(&store, Some(category), &params).await?;
    Ok(Json(page))
}

async fn article_by_id(
    State(store): State<Arc<ArticleStore>>,
    Path(id): Path<String>,
) -> Result<Json<ArticleItem>, ApiError> {
    let row = store
        .article_detail(&id)
        .await?
        .ok_or(PipelineError::ArticleNotFound { id })?;

    Ok(Json(article_item(row)))
}

async fn categories(
    State(store): State<Arc<ArticleStore>>,
) -> Result<Json<CategoryList>, ApiError> {
    let items = store.distinct_primary_categories().await?;
    Ok(Json(CategoryList { items }))
}

async fn sources(State(store): State<Arc<ArticleStore>>) -> Result<Json<SourceList>, ApiError> {
    let items = store
        .active_sources()
        .await?
        .into_iter()
        .map(|source| SourceItem {
            id: source.id,
            name: source.name,
            url: source.url,
        })
        .collect();

    Ok(Json(SourceList { items }))
}

async fn feed_page(
    store: &ArticleStore,
    category: Option<String>,
    params: &FeedParams,
) -> Result<FeedPage, ApiError> {
    let limit = validate_limit(params.limit)?;

    let before = params
        .cursor
        .as_deref()
        .map(parse_cursor)
        .transpose()?;

    let source_ids = params.sources.as_deref().map(parse_sources_param);
    if matches!(&source_ids, Some(ids) if ids.is_empty()) {
        // The caller explicitly asked for nothing.
        return Ok(FeedPage {
            items: Vec::new(),
            next_cursor: None,
        });
    }

    let rows = store
        .feed_page(&FeedPageQuery {
            category,
            source_ids,
            before,
            limit: limit + 1,
        })
        .await?;

    let (rows, next_cursor) = paginate(rows, limit as usize);
    let items = rows.into_iter().map(article_item).collect();

    Ok(FeedPage { items, next_cursor })
}

/// Validate the page-size parameter; absent means the default, anything
/// outside the allowed window is a client error.
pub fn validate_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    match limit {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(limit) if (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&limit) => Ok(limit),
        Some(limit) => Err(ApiError::bad_request(format!(
            "limit must be between {} and {}, got {}",
            MIN_PAGE_SIZE, MAX_PAGE_SIZE, limit
        ))),
    }
}

/// Feed filter categories are a closed set the caller should know; an
/// unrecognized value is a 404, not an empty result.
pub fn check_feed_category(category: &str) -> Result<(), ApiError> {
    if FEED_CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(ApiError::not_found("Category not found"))
    }
}

/// Split a `limit + 1` row fetch into the page actually returned and the
/// cursor for the next page, if one exists. The cursor is the published
/// timestamp of the last returned item; a request with it returns only
/// strictly older items, so concurrent inserts ahead of the window never
/// shift or duplicate pages.
pub fn paginate(mut rows: Vec<FeedRow>, limit: usize) -> (Vec<FeedRow>, Option<String>) {
    if rows.len() > limit {
        rows.truncate(limit);
        let next_cursor = rows.last().map(|row| cursor_value(row.published_at));
        (rows, next_cursor)
    } else {
        (rows, None)
    }
}

/// Render the keyset cursor at the database's full timestamp precision.
/// Display timestamps round to whole seconds, but the strict `<` comparison
/// happens at microsecond precision; a rounded cursor would skip older rows
/// inside the same second.
fn cursor_value(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse a keyset cursor: ISO-8601 with an offset (normally `Z`), normalized
/// to UTC. A malformed cursor is a client error, never an empty result.
pub fn parse_cursor(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| ApiError::bad_request(format!("Invalid cursor: {}", raw)))
}

/// Parse the comma-separated source filter. An empty or all-blank value
/// yields an empty set, which the feed treats as "explicitly nothing".
pub fn parse_sources_param(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .collect()
}

fn article_item(row: FeedRow) -> ArticleItem {
    ArticleItem {
        id: row.id,
        title: row.title,
        category: row.category,
        primary_category: row.primary_category,
        published_at: to_iso8601(row.published_at),
        summary: row.summary_text,
        source: SourceItem {
            id: row.source_id,
            name: row.source_name,
            url: row.source_url,
        },
        original_url: row.canonical_url,
    }
}
