use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Legacy per-source categories accepted by the feed filter endpoints.
pub const FEED_CATEGORIES: &[&str] = &[
    "models", "hardware", "research", "policy", "industry", "tools",
];

/// Closed set of labels the classifier is allowed to assign.
pub const PRIMARY_CATEGORIES: &[&str] = &[
    "models",
    "research",
    "products",
    "open_source",
    "hardware",
    "regulation",
];

/// Terminal label for articles the classifier could not place.
pub const FALLBACK_CATEGORY: &str = "uncategorized";

pub const SUMMARY_MODEL: &str = "gpt-4.1-mini";
pub const SUMMARY_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    pub rss_url: String,
    pub default_category: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub canonical_url: String,
    pub source_id: String,
    pub title: String,
    pub category: String,
    pub primary_category: Option<String>,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub article_id: String,
    pub summary_text: String,
    pub model: String,
    pub version: i32,
    pub generated_at: DateTime<Utc>,
}

/// An entry extracted from a feed document, not yet resolved against the store.
#[derive(Debug, Clone)]
pub struct CandidateArticle {
    pub id: String,
    pub canonical_url: String,
    pub source_id: String,
    pub title: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSummary {
    pub article_id: String,
    pub summary_text: String,
    pub model: String,
    pub version: i32,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Article not found: {id}")]
    ArticleNotFound { id: String },

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Render a display timestamp: ISO-8601, UTC, `Z` suffix, second precision.
/// Keyset cursors carry full precision and are rendered separately.
pub fn to_iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
