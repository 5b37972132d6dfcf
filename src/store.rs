use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::enrich::{EnrichmentCandidate, EnrichmentStore};
use crate::ingest::{IngestStore, InsertOutcome};
use crate::types::{CandidateArticle, NewSummary, Result, Source, FALLBACK_CATEGORY};

/// One article row joined with its source and (optionally) its summary, as
/// served by the read API.
#[derive(Debug, Clone)]
pub struct FeedRow {
    pub id: String,
    pub title: String,
    pub category: String,
    pub primary_category: Option<String>,
    pub published_at: DateTime<Utc>,
    pub canonical_url: String,
    pub summary_text: Option<String>,
    pub source_id: String,
    pub source_name: String,
    pub source_url: String,
}

/// Filter and window for one keyset page of the feed.
#[derive(Debug, Clone, Default)]
pub struct FeedPageQuery {
    pub category: Option<String>,
    /// None means no source filter; Some restricts to these ids, intersected
    /// with currently-active sources.
    pub source_ids: Option<Vec<String>>,
    /// Exclusive upper bound on published_at (the keyset cursor).
    pub before: Option<DateTime<Utc>>,
    pub limit: i64,
}

/// Relational store for sources, articles, and summaries. The canonical-URL
/// uniqueness constraint lives here and is the ground truth for article
/// identity; callers resolve conflicts, never this layer.
pub struct ArticleStore {
    pool: PgPool,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

impl ArticleStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// One keyset page: enrichment-complete articles, newest first. Fetch
    /// `limit + 1` rows from here to detect whether a next page exists.
    pub async fn feed_page(&self, query: &FeedPageQuery) -> Result<Vec<FeedRow>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.title, a.category, a.primary_category, a.published_at,
                   a.canonical_url, s.summary_text,
                   src.id AS source_id, src.name AS source_name, src.url AS source_url
            FROM articles a
            JOIN summaries s ON s.article_id = a.id
            JOIN sources src ON src.id = a.source_id
            WHERE ($1::text IS NULL OR a.category = $1)
              AND ($2::timestamptz IS NULL OR a.published_at < $2)
              AND ($3::text[] IS NULL OR (src.active AND a.source_id = ANY($3)))
            ORDER BY a.published_at DESC, a.id ASC
            LIMIT $4
            "#,
        )
        .bind(&query.category)
        .bind(query.before)
        .bind(&query.source_ids)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| feed_row(&row)).collect()
    }

    /// Detail lookup by identifier. Does not require a summary to exist; the
    /// summary field is simply absent for an article not yet enriched.
    pub async fn article_detail(&self, id: &str) -> Result<Option<FeedRow>> {
        let row = sqlx::query(
            r#"
            SELECT a.id, a.title, a.category, a.primary_category, a.published_at,
                   a.canonical_url, s.summary_text,
                   src.id AS source_id, src.name AS source_name, src.url AS source_url
            FROM articles a
            LEFT JOIN summaries s ON s.article_id = a.id
            JOIN sources src ON src.id = a.source_id
            WHERE a.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| feed_row(&row)).transpose()
    }

    /// Distinct assigned categories across enriched articles, fallback and
    /// empty values excluded, ascending.
    pub async fn distinct_primary_categories(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT a.primary_category
            FROM articles a
            JOIN summaries s ON s.article_id = a.id
            WHERE a.primary_category IS NOT NULL
              AND a.primary_category <> ''
              AND a.primary_category <> $1
            ORDER BY a.primary_category ASC
            "#,
        )
        .bind(FALLBACK_CATEGORY)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn active_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, url, rss_url, default_category, active, created_at
            FROM sources
            WHERE active = TRUE
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Source {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    rss_url: row.try_get("rss_url")?,
                    default_category: row.try_get("default_category")?,
                    active: row.try_get("active")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn feed_row(row: &sqlx::postgres::PgRow) -> Result<FeedRow> {
    Ok(FeedRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        primary_category: row.try_get("primary_category")?,
        published_at: row.try_get("published_at")?,
        canonical_url: row.try_get("canonical_url")?,
        summary_text: row.try_get("summary_text")?,
        source_id: row.try_get("source_id")?,
        source_name: row.try_get("source_name")?,
        source_url: row.try_get("source_url")?,
    })
}

fn enrichment_candidate(row: &sqlx::postgres::PgRow) -> Result<EnrichmentCandidate> {
    Ok(EnrichmentCandidate {
        article_id: row.try_get("id")?,
        title: row.try_get("title")?,
        canonical_url: row.try_get("canonical_url")?,
        category: row.try_get("category")?,
        source_name: row.try_get("source_name")?,
        summary_text: row.try_get("summary_text")?,
    })
}

#[async_trait]
impl IngestStore for ArticleStore {
    async fn ensure_source(&self, source: &SourceConfig) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO sources (id, name, url, rss_url, default_category, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(source.id)
        .bind(source.name)
        .bind(source.url)
        .bind(source.rss_url)
        .bind(source.category)
        .bind(source.active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Registered new source {}", source.id);
        }
        Ok(())
    }

    async fn article_id_by_canonical_url(&self, canonical_url: &str) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT id FROM articles WHERE canonical_url = $1",
        )
        .bind(canonical_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_article(
        &self,
        candidate: &CandidateArticle,
        ingested_at: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (id, canonical_url, source_id, title, category,
                                  published_at, ingested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&candidate.id)
        .bind(&candidate.canonical_url)
        .bind(&candidate.source_id)
        .bind(&candidate.title)
        .bind(&candidate.category)
        .bind(candidate.published_at)
        .bind(ingested_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Inserted article {}", candidate.id);
                Ok(InsertOutcome::Inserted)
            }
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::DuplicateUrl),
            Err(e) => Err(e.into()),
        }
    }

    async fn has_summary(&self, article_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM summaries WHERE article_id = $1)",
        )
        .bind(article_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert_summary(&self, summary: &NewSummary) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO summaries (article_id, summary_text, model, version, generated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&summary.article_id)
        .bind(&summary.summary_text)
        .bind(&summary.model)
        .bind(summary.version)
        .bind(summary.generated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EnrichmentStore for ArticleStore {
    async fn count_missing_summaries(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM articles a
            LEFT JOIN summaries s ON s.article_id = a.id
            WHERE s.article_id IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn missing_summary_batch(
        &self,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<EnrichmentCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.title, a.canonical_url, a.category,
                   src.name AS source_name, NULL::text AS summary_text
            FROM articles a
            JOIN sources src ON src.id = a.source_id
            LEFT JOIN summaries s ON s.article_id = a.id
            WHERE s.article_id IS NULL
              AND ($1::text IS NULL OR a.id > $1)
            ORDER BY a.id ASC
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| enrichment_candidate(&row)).collect()
    }

    async fn has_summary(&self, article_id: &str) -> Result<bool> {
        IngestStore::has_summary(self, article_id).await
    }

    async fn insert_summary(&self, summary: &NewSummary) -> Result<bool> {
        IngestStore::insert_summary(self, summary).await
    }

    async fn count_missing_categories(&self, include_fallback: bool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM articles a
            JOIN summaries s ON s.article_id = a.id
            WHERE a.primary_category IS NULL
               OR ($1 AND a.primary_category = $2)
            "#,
        )
        .bind(include_fallback)
        .bind(FALLBACK_CATEGORY)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn missing_category_batch(
        &self,
        after: Option<&str>,
        limit: i64,
        include_fallback: bool,
    ) -> Result<Vec<EnrichmentCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.title, a.canonical_url, a.category,
                   src.name AS source_name, s.summary_text
            FROM articles a
            JOIN summaries s ON s.article_id = a.id
            JOIN sources src ON src.id = a.source_id
            WHERE (a.primary_category IS NULL
                   OR ($1 AND a.primary_category = $2))
              AND ($3::text IS NULL OR a.id > $3)
            ORDER BY a.id ASC
            LIMIT $4
            "#,
        )
        .bind(include_fallback)
        .bind(FALLBACK_CATEGORY)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| enrichment_candidate(&row)).collect()
    }

    async fn primary_category(&self, article_id: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, Option<String>>(
            "SELECT primary_category FROM articles WHERE id = $1",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.flatten())
    }

    async fn set_primary_category(
        &self,
        article_id: &str,
        category: &str,
        overwrite_fallback: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET primary_category = $1
            WHERE id = $2
              AND (primary_category IS NULL
                   OR ($3 AND primary_category = $4))
            "#,
        )
        .bind(category)
        .bind(article_id)
        .bind(overwrite_fallback)
        .bind(FALLBACK_CATEGORY)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
