use std::time::Duration;

use feed_rs::parser;
use reqwest::Client;
use tracing::{debug, warn};

use crate::canonical::{canonicalize_url, derive_article_id};
use crate::config::SourceConfig;
use crate::types::{CandidateArticle, PipelineError, Result};

const USER_AGENT: &str = "newsbrief/0.1";

/// Turns one fetched feed document into a sequence of candidate articles.
///
/// Fetch-level failures never escape this component: a source whose feed is
/// unreachable, returns a non-success status, or fails to parse yields an
/// empty sequence so the remaining sources are unaffected.
pub struct FeedReader {
    client: Client,
}

impl FeedReader {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Fetch and parse one source's feed. The read timeout is scoped to this
    /// single request rather than mutating any shared client default, so
    /// concurrent fetches with different budgets never observe each other.
    pub async fn read(&self, source: &SourceConfig, timeout: Duration) -> Vec<CandidateArticle> {
        let body = match self.fetch(&source.rss_url, timeout).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to load feed {}: {}", source.rss_url, e);
                return Vec::new();
            }
        };

        match candidates_from_document(&body, source) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Feed parse issue for {}: {}", source.rss_url, e);
                Vec::new()
            }
        }
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

impl Default for FeedReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract candidate articles from a raw feed document, in document order.
///
/// Entries lacking a title, a link, or a resolvable timestamp are silently
/// dropped; feeds routinely carry partial entries and they are not errors.
/// Published timestamps prefer the entry's publish time over its update
/// time; feed-rs has already normalized both to UTC, folding in relaxed
/// parsing of free-text date strings.
pub fn candidates_from_document(
    body: &[u8],
    source: &SourceConfig,
) -> Result<Vec<CandidateArticle>> {
    let feed = parser::parse(body).map_err(|e| PipelineError::Parse(e.to_string()))?;

    let mut candidates = Vec::new();

    for entry in feed.entries {
        let title = match entry.title {
            Some(title) if !title.content.is_empty() => title.content,
            _ => continue,
        };

        let link = match entry.links.first() {
            Some(link) if !link.href.is_empty() => link.href.clone(),
            _ => continue,
        };

        let published_at = match entry.published.or(entry.updated) {
            Some(ts) => ts,
            None => {
                debug!("Dropping entry without a resolvable timestamp: {}", link);
                continue;
            }
        };

        let canonical_url = canonicalize_url(&link);
        let id = derive_article_id(&canonical_url, &title);

        candidates.push(CandidateArticle {
            id,
            canonical_url,
            source_id: source.id.to_string(),
            title,
            category: source.category.to_string(),
            published_at,
        });
    }

    Ok(candidates)
}
