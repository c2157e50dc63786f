// Diagnostic entry point: run the diff logic against one explicit snapshot
// pair with step-by-step logging and no writes (the duplicate check still
// reads). Useful when a source misbehaves in the daily run.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ai_client::OpenAi;
use pagewatch_common::{provider_profile, Config};
use pagewatch_watcher::differ::DiffSummarizer;
use pagewatch_watcher::governor::{RateGovernor, RateLimits};
use pagewatch_watcher::store::PgStore;

#[derive(Parser)]
#[command(about = "Dry-run the diff summarizer against two snapshot ids")]
struct Args {
    /// First snapshot id (order does not matter; captured_at decides).
    snapshot_id1: Uuid,
    /// Second snapshot id.
    snapshot_id2: Uuid,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pagewatch=debug".parse()?))
        .init();

    let args = Args::parse();

    let config = Config::from_env()?;
    let profile = provider_profile(&config.provider)
        .expect("profile existence checked during config load")
        .clone();

    let store = PgStore::connect(&config.database_url).await?;

    let client = match profile.base_url {
        Some(url) => OpenAi::new(&config.provider_api_key).with_base_url(url),
        None => OpenAi::new(&config.provider_api_key),
    };
    let governed = Arc::new(RateGovernor::new(Arc::new(client), RateLimits::new()));

    let differ = DiffSummarizer::new(Arc::new(store), governed, profile);
    differ.diagnose_pair(args.snapshot_id1, args.snapshot_id2).await
}
