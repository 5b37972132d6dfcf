use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use newsbrief::config::{default_sources, Config};
use newsbrief::enrich::{run_category_backfill, run_summary_backfill, BackfillOptions};
use newsbrief::ingest::IngestCoordinator;
use newsbrief::llm::{
    Classifier, OpenAiClassifier, OpenAiClient, OpenAiSummarizer, Summarizer,
};
use newsbrief::store::ArticleStore;
use newsbrief::types::{PipelineError, SUMMARY_MODEL};

#[derive(Parser)]
#[command(name = "newsbrief", about = "RSS ingestion and summarized-news feed backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the read API server, with a best-effort ingestion pass at startup.
    Serve {
        #[arg(long)]
        skip_initial_ingest: bool,
    },
    /// Run one ingestion pass over the configured sources.
    Ingest,
    /// Fill in summaries for articles that have none.
    BackfillSummaries {
        #[arg(long, default_value_t = 25, value_parser = clap::value_parser!(i64).range(1..))]
        batch_size: i64,
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        limit: Option<i64>,
    },
    /// Classify enriched articles that have no primary category.
    BackfillCategories {
        #[arg(long, default_value_t = 25, value_parser = clap::value_parser!(i64).range(1..))]
        batch_size: i64,
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        limit: Option<i64>,
        /// Also re-classify articles already marked with the fallback label.
        #[arg(long)]
        retry_fallback: bool,
    },
}

fn openai_client(config: &Config) -> Result<OpenAiClient, PipelineError> {
    let api_key = config
        .openai_api_key
        .clone()
        .ok_or_else(|| PipelineError::Config("OPENAI_API_KEY is not set".to_string()))?;

    Ok(OpenAiClient::new(api_key, SUMMARY_MODEL.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "newsbrief=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = Arc::new(ArticleStore::connect(&config.database_url).await?);
    store.migrate().await?;

    match cli.command {
        Command::Serve { skip_initial_ingest } => {
            if !skip_initial_ingest {
                let coordinator = build_coordinator(&config, store.clone());
                tokio::spawn(async move {
                    let report = coordinator.run(&default_sources()).await;
                    if report.failures > 0 {
                        error!("Initial ingestion finished with {} failures", report.failures);
                    }
                });
            }

            let app = newsbrief::api::router(store);
            let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
            info!("Serving feed API on {}", config.bind_addr);
            axum::serve(listener, app).await?;
        }
        Command::Ingest => {
            let coordinator = build_coordinator(&config, store);
            coordinator.run(&default_sources()).await;
        }
        Command::BackfillSummaries { batch_size, limit } => {
            let summarizer = OpenAiSummarizer::new(openai_client(&config)?);
            let options = BackfillOptions {
                batch_size,
                limit,
                ..Default::default()
            };
            run_summary_backfill(store.as_ref(), &summarizer, &options).await?;
        }
        Command::BackfillCategories {
            batch_size,
            limit,
            retry_fallback,
        } => {
            let classifier: Box<dyn Classifier> =
                Box::new(OpenAiClassifier::new(openai_client(&config)?));
            let options = BackfillOptions {
                batch_size,
                limit,
                retry_fallback,
            };
            run_category_backfill(store.as_ref(), classifier.as_ref(), &options).await?;
        }
    }

    Ok(())
}

fn build_coordinator(config: &Config, store: Arc<ArticleStore>) -> IngestCoordinator<ArticleStore> {
    let mut coordinator = IngestCoordinator::new(store, config.feed_timeout);

    // Inline summarization is best-effort; without a key the backfill job
    // picks the articles up later.
    if config.openai_api_key.is_some() {
        if let Ok(client) = openai_client(config) {
            let summarizer: Arc<dyn Summarizer> = Arc::new(OpenAiSummarizer::new(client));
            coordinator = coordinator.with_summarizer(summarizer);
        }
    }

    coordinator
}
