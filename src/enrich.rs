use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::llm::{Classifier, ClassifyRequest, Summarizer, SummaryRequest};
use crate::types::{NewSummary, Result, FALLBACK_CATEGORY, PRIMARY_CATEGORIES, SUMMARY_VERSION};

/// One article selected by a backfill scan, with the attributes the external
/// generation/classification calls need.
#[derive(Debug, Clone)]
pub struct EnrichmentCandidate {
    pub article_id: String,
    pub title: String,
    pub canonical_url: String,
    pub category: String,
    pub source_name: String,
    pub summary_text: Option<String>,
}

/// Persistence operations the backfill jobs need. Batch queries order by
/// ascending article id and honor an `after` resume cursor so a run never
/// re-scans rows it has already passed, even as the matching set shrinks
/// underneath it.
#[async_trait]
pub trait EnrichmentStore: Send + Sync {
    async fn count_missing_summaries(&self) -> Result<i64>;

    async fn missing_summary_batch(
        &self,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<EnrichmentCandidate>>;

    async fn has_summary(&self, article_id: &str) -> Result<bool>;

    /// Create-once write; returns false when a concurrent writer already
    /// created the summary (benign skip).
    async fn insert_summary(&self, summary: &NewSummary) -> Result<bool>;

    /// Only enriched articles (those with a summary) are candidates for
    /// classification. `include_fallback` widens the missing predicate to
    /// rows already marked with the fallback label.
    async fn count_missing_categories(&self, include_fallback: bool) -> Result<i64>;

    async fn missing_category_batch(
        &self,
        after: Option<&str>,
        limit: i64,
        include_fallback: bool,
    ) -> Result<Vec<EnrichmentCandidate>>;

    async fn primary_category(&self, article_id: &str) -> Result<Option<String>>;

    /// Guarded write: assigns only while the category is still absent (or,
    /// with `overwrite_fallback`, still the fallback label). Returns false
    /// when a concurrent writer got there first.
    async fn set_primary_category(
        &self,
        article_id: &str,
        category: &str,
        overwrite_fallback: bool,
    ) -> Result<bool>;
}

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub batch_size: i64,
    pub limit: Option<i64>,
    /// Re-select articles already marked with the fallback category. Off by
    /// default: a failed classification is a terminal state, not a retry.
    pub retry_fallback: bool,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: 25,
            limit: None,
            retry_fallback: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillReport {
    pub processed: usize,
    pub filled: usize,
    pub skipped: usize,
    pub fallbacks: usize,
    pub failures: usize,
}

/// Map a raw classifier label onto the allowed set; anything else (including
/// no label at all) becomes the fallback category.
pub fn normalize_category(value: Option<&str>) -> String {
    match value {
        Some(raw) => {
            let normalized = raw.trim().to_lowercase();
            if PRIMARY_CATEGORIES.contains(&normalized.as_str()) {
                normalized
            } else {
                FALLBACK_CATEGORY.to_string()
            }
        }
        None => FALLBACK_CATEGORY.to_string(),
    }
}

/// Scan for articles without a summary and fill them in, one at a time.
/// Idempotent: the missing predicate is re-checked immediately before each
/// write, and a uniqueness conflict from a concurrent writer is a benign
/// skip. Per-item failures are logged and counted, never aborting the run.
pub async fn run_summary_backfill(
    store: &dyn EnrichmentStore,
    summarizer: &dyn Summarizer,
    options: &BackfillOptions,
) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();

    let total_missing = store.count_missing_summaries().await?;
    if total_missing == 0 {
        info!("No missing summaries found");
        return Ok(report);
    }

    let target = options
        .limit
        .map(|limit| limit.min(total_missing))
        .unwrap_or(total_missing);
    info!("Backfilling summaries for up to {} articles", target);

    let mut last_id: Option<String> = None;

    while (report.processed as i64) < target {
        let remaining = target - report.processed as i64;
        let batch = store
            .missing_summary_batch(last_id.as_deref(), options.batch_size.min(remaining))
            .await?;
        if batch.is_empty() {
            break;
        }

        for item in batch {
            if report.processed as i64 >= target {
                break;
            }
            report.processed += 1;
            last_id = Some(item.article_id.clone());

            match store.has_summary(&item.article_id).await {
                Ok(true) => {
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Summary lookup failed for {}: {}", item.article_id, e);
                    report.failures += 1;
                    continue;
                }
            }

            let request = SummaryRequest {
                title: item.title.clone(),
                source_name: item.source_name.clone(),
                original_url: item.canonical_url.clone(),
                category: item.category.clone(),
            };

            let text = match summarizer.summarize(&request).await {
                Ok(Some(text)) => text,
                Ok(None) => {
                    warn!("Empty summary for article {}", item.article_id);
                    report.failures += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Summarization failed for {}: {}", item.article_id, e);
                    report.failures += 1;
                    continue;
                }
            };

            let summary = NewSummary {
                article_id: item.article_id.clone(),
                summary_text: text,
                model: summarizer.model().to_string(),
                version: SUMMARY_VERSION,
                generated_at: Utc::now(),
            };

            match store.insert_summary(&summary).await {
                Ok(true) => report.filled += 1,
                Ok(false) => {
                    // Another writer created it between the re-check and the
                    // insert; the row exists, which is all that matters.
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Failed to persist summary for {}: {}", item.article_id, e);
                    report.failures += 1;
                }
            }
        }
    }

    info!(
        "Summary backfill done: {} processed, {} filled, {} skipped, {} failures",
        report.processed, report.filled, report.skipped, report.failures
    );
    Ok(report)
}

/// Scan for enriched articles without a primary category and classify them.
/// A label outside the allowed set, an empty response, or a hard failure of
/// the classifier all persist the fallback label, so an absent category never
/// survives past one backfill attempt and the backlog strictly shrinks.
pub async fn run_category_backfill(
    store: &dyn EnrichmentStore,
    classifier: &dyn Classifier,
    options: &BackfillOptions,
) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();

    let total_missing = store.count_missing_categories(options.retry_fallback).await?;
    if total_missing == 0 {
        info!("No missing primary categories found");
        return Ok(report);
    }

    let target = options
        .limit
        .map(|limit| limit.min(total_missing))
        .unwrap_or(total_missing);
    info!("Backfilling primary categories for up to {} articles", target);

    let mut last_id: Option<String> = None;

    while (report.processed as i64) < target {
        let remaining = target - report.processed as i64;
        let batch = store
            .missing_category_batch(
                last_id.as_deref(),
                options.batch_size.min(remaining),
                options.retry_fallback,
            )
            .await?;
        if batch.is_empty() {
            break;
        }

        for item in batch {
            if report.processed as i64 >= target {
                break;
            }
            report.processed += 1;
            last_id = Some(item.article_id.clone());

            let still_missing = match store.primary_category(&item.article_id).await {
                Ok(None) => true,
                Ok(Some(current)) => {
                    options.retry_fallback && current == FALLBACK_CATEGORY
                }
                Err(e) => {
                    warn!("Category lookup failed for {}: {}", item.article_id, e);
                    report.failures += 1;
                    continue;
                }
            };
            if !still_missing {
                report.skipped += 1;
                continue;
            }

            let request = ClassifyRequest {
                title: item.title.clone(),
                source_name: item.source_name.clone(),
                canonical_url: item.canonical_url.clone(),
                summary_text: item.summary_text.clone(),
                legacy_category: item.category.clone(),
            };

            let assigned = match classifier.classify(&request).await {
                Ok(label) => normalize_category(label.as_deref()),
                Err(e) => {
                    warn!("Classification failed for {}: {}", item.article_id, e);
                    FALLBACK_CATEGORY.to_string()
                }
            };

            match store
                .set_primary_category(&item.article_id, &assigned, options.retry_fallback)
                .await
            {
                Ok(true) => {
                    report.filled += 1;
                    if assigned == FALLBACK_CATEGORY {
                        report.fallbacks += 1;
                    }
                }
                Ok(false) => {
                    // A concurrent writer assigned a label between the
                    // re-check and this write; the guard kept theirs.
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to persist category for {}: {}",
                        item.article_id, e
                    );
                    report.failures += 1;
                }
            }
        }
    }

    info!(
        "Category backfill done: {} processed, {} filled, {} skipped, {} fallbacks, {} failures",
        report.processed, report.filled, report.skipped, report.fallbacks, report.failures
    );
    Ok(report)
}
