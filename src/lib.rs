pub mod api;
pub mod canonical;
pub mod config;
pub mod enrich;
pub mod feed;
pub mod ingest;
pub mod llm;
pub mod store;
pub mod types;

pub use canonical::{canonicalize_url, derive_article_id};
pub use config::{default_sources, Config, SourceConfig};
pub use feed::FeedReader;
pub use ingest::IngestCoordinator;
pub use store::ArticleStore;
pub use types::*;
