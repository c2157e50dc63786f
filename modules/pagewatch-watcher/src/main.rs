use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use pagewatch_common::{provider_profile, Config};
use pagewatch_watcher::governor::{RateGovernor, RateLimits};
use pagewatch_watcher::pipeline;
use pagewatch_watcher::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pagewatch=info".parse()?))
        .init();

    info!("PageWatch watcher starting...");

    // Load config and select the provider profile
    let config = Config::from_env()?;
    let profile = provider_profile(&config.provider)
        .expect("profile existence checked during config load")
        .clone();
    info!(provider = profile.name, diff_model = profile.diff_model,
        classify_model = profile.classify_model, "Provider selected");

    // Connect to Postgres and run migrations
    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    // Build the governed provider client
    let client = match profile.base_url {
        Some(url) => OpenAi::new(&config.provider_api_key).with_base_url(url),
        None => OpenAi::new(&config.provider_api_key),
    };
    let governed = Arc::new(RateGovernor::new(Arc::new(client), RateLimits::new()));

    // Run both phases
    pipeline::run(Arc::new(store), governed, profile).await?;

    info!("PageWatch run complete");
    Ok(())
}
