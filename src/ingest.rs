use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::feed::FeedReader;
use crate::llm::{Summarizer, SummaryRequest};
use crate::types::{CandidateArticle, NewSummary, Result, SUMMARY_VERSION};

/// Result of attempting to insert an article row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The canonical-URL uniqueness constraint rejected the write.
    DuplicateUrl,
}

/// Persistence operations the ingestion path needs. The store translates a
/// uniqueness violation into `InsertOutcome::DuplicateUrl` instead of an
/// error; every other persistence failure propagates.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Insert the source row if absent; an existing row is never updated here.
    async fn ensure_source(&self, source: &SourceConfig) -> Result<()>;

    async fn article_id_by_canonical_url(&self, canonical_url: &str) -> Result<Option<String>>;

    async fn insert_article(
        &self,
        candidate: &CandidateArticle,
        ingested_at: DateTime<Utc>,
    ) -> Result<InsertOutcome>;

    async fn has_summary(&self, article_id: &str) -> Result<bool>;

    /// Create-once write; returns false when a summary already existed.
    async fn insert_summary(&self, summary: &NewSummary) -> Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub sources: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failures: usize,
}

/// Resolves candidate articles against persisted state, inserting each
/// logical article at most once.
///
/// Concurrency rests on the database's canonical-URL uniqueness constraint:
/// the existence pre-check is only an optimization, and a conflict raised by
/// a concurrent run is resolved by re-query and treated as a successful skip.
pub struct IngestCoordinator<S: IngestStore> {
    store: Arc<S>,
    reader: FeedReader,
    summarizer: Option<Arc<dyn Summarizer>>,
    feed_timeout: Duration,
}

impl<S: IngestStore> IngestCoordinator<S> {
    pub fn new(store: Arc<S>, feed_timeout: Duration) -> Self {
        Self {
            store,
            reader: FeedReader::new(),
            summarizer: None,
            feed_timeout,
        }
    }

    /// Attach a summarizer for best-effort inline enrichment of first inserts.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Run one ingestion pass over the configured sources. Failures are
    /// isolated per source: a broken feed or a failed write is logged and
    /// counted, and the next source is still attempted.
    pub async fn run(&self, sources: &[SourceConfig]) -> IngestReport {
        let mut report = IngestReport::default();

        for source in sources {
            if !source.active {
                debug!("Skipping inactive source {}", source.id);
                continue;
            }
            report.sources += 1;

            if let Err(e) = self.ingest_source(source, &mut report).await {
                error!("Failed processing source {}: {}", source.id, e);
                report.failures += 1;
            }
        }

        info!(
            "Ingestion finished: {} sources, {} entries, {} inserted, {} duplicates, {} failures",
            report.sources, report.fetched, report.inserted, report.duplicates, report.failures
        );
        report
    }

    async fn ingest_source(&self, source: &SourceConfig, report: &mut IngestReport) -> Result<()> {
        self.store.ensure_source(source).await?;

        let candidates = self.reader.read(source, self.feed_timeout).await;
        self.ingest_candidates(source, candidates, report).await
    }

    /// Resolve a batch of candidates against the store, inserting each at
    /// most once. Public seam: the feed read and the identity resolution are
    /// independent steps.
    pub async fn ingest_candidates(
        &self,
        source: &SourceConfig,
        candidates: Vec<CandidateArticle>,
        report: &mut IngestReport,
    ) -> Result<()> {
        for candidate in candidates {
            report.fetched += 1;

            if self
                .store
                .article_id_by_canonical_url(&candidate.canonical_url)
                .await?
                .is_some()
            {
                report.duplicates += 1;
                continue;
            }

            match self.store.insert_article(&candidate, Utc::now()).await? {
                InsertOutcome::Inserted => {
                    report.inserted += 1;
                    self.enrich_inline(source, &candidate).await;
                }
                InsertOutcome::DuplicateUrl => {
                    // A concurrent run inserted the same canonical URL between
                    // the check and the write. The constraint is ground truth;
                    // confirm the row and move on.
                    let existing = self
                        .store
                        .article_id_by_canonical_url(&candidate.canonical_url)
                        .await?;
                    if existing.is_none() {
                        warn!(
                            "Conflicting row for {} vanished after insert conflict",
                            candidate.canonical_url
                        );
                    }
                    report.duplicates += 1;
                }
            }
        }

        Ok(())
    }

    /// Best-effort summary generation for a freshly inserted article. An
    /// article with no summary is valid, if incomplete, persisted state; the
    /// backfill job reconciles it later.
    async fn enrich_inline(&self, source: &SourceConfig, candidate: &CandidateArticle) {
        let Some(summarizer) = &self.summarizer else {
            return;
        };

        match self.store.has_summary(&candidate.id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!("Summary lookup failed for {}: {}", candidate.id, e);
                return;
            }
        }

        let request = SummaryRequest {
            title: candidate.title.clone(),
            source_name: source.name.to_string(),
            original_url: candidate.canonical_url.clone(),
            category: candidate.category.clone(),
        };

        let text = match summarizer.summarize(&request).await {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                warn!("Summarization failed for {}: {}", candidate.canonical_url, e);
                return;
            }
        };

        let summary = NewSummary {
            article_id: candidate.id.clone(),
            summary_text: text,
            model: summarizer.model().to_string(),
            version: SUMMARY_VERSION,
            generated_at: Utc::now(),
        };

        if let Err(e) = self.store.insert_summary(&summary).await {
            warn!("Failed to persist summary for {}: {}", candidate.id, e);
        }
    }
}
