use std::env;
use std::time::Duration;

use crate::types::{PipelineError, Result};

/// Process configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub feed_timeout: Duration,
    pub openai_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| PipelineError::Config("DATABASE_URL is not set".to_string()))?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let feed_timeout_secs = env::var("FEED_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let openai_api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

        Ok(Self {
            database_url,
            bind_addr,
            feed_timeout: Duration::from_secs(feed_timeout_secs),
            openai_api_key,
        })
    }
}

/// Static descriptor for a feed-publishing source. Source rows are created
/// from these on first ingestion and never updated by the ingest path.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    pub rss_url: &'static str,
    pub category: &'static str,
    pub active: bool,
}

pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            id: "src_openai",
            name: "OpenAI",
            url: "https://openai.com",
            rss_url: "https://openai.com/news/rss.xml",
            category: "models",
            active: true,
        },
        SourceConfig {
            id: "src_google_ai",
            name: "Google AI Blog",
            url: "https://blog.google/technology/ai/",
            rss_url: "https://blog.google/technology/ai/rss/",
            category: "research",
            active: true,
        },
        SourceConfig {
            id: "src_meta_ai",
            name: "Meta AI",
            url: "https://ai.meta.com/blog/",
            rss_url: "https://ai.meta.com/blog/rss/",
            category: "industry",
            active: true,
        },
    ]
}
