use std::env;

use crate::error::PageWatchError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // LLM provider
    pub provider: String,
    pub provider_api_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// The provider is selected by `PAGEWATCH_PROVIDER` (default "openai");
    /// its API key comes from the env var named in the provider profile.
    pub fn from_env() -> Result<Self, PageWatchError> {
        let provider = env::var("PAGEWATCH_PROVIDER").unwrap_or_else(|_| "openai".to_string());

        let profile = provider_profile(&provider).ok_or_else(|| {
            PageWatchError::Config(format!("unknown provider: {provider}"))
        })?;

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            provider,
            provider_api_key: required_env(profile.api_key_var)?,
        })
    }
}

fn required_env(key: &str) -> Result<String, PageWatchError> {
    env::var(key)
        .map_err(|_| PageWatchError::Config(format!("{key} environment variable is required")))
}

// --- Provider profiles ---

/// Compile-time profile for one LLM backend. Swapping backends is a config
/// change, never a code change at the call sites.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: &'static str,
    /// Env var holding this provider's API key.
    pub api_key_var: &'static str,
    /// Chat-completions base URL; `None` means the OpenAI default.
    pub base_url: Option<&'static str>,
    /// Model used for diff summarization.
    pub diff_model: &'static str,
    /// Model used for change classification.
    pub classify_model: &'static str,
    /// Context window of the diff model, in tokens.
    pub context_tokens: u64,
}

const PROFILES: &[ProviderProfile] = &[
    ProviderProfile {
        name: "openai",
        api_key_var: "OPENAI_API_KEY",
        base_url: None,
        diff_model: "gpt-4o-mini",
        classify_model: "gpt-4o-mini",
        context_tokens: 128_000,
    },
    ProviderProfile {
        name: "openrouter",
        api_key_var: "OPENROUTER_API_KEY",
        base_url: Some("https://openrouter.ai/api/v1"),
        diff_model: "google/gemini-2.0-flash-001",
        classify_model: "google/gemini-2.0-flash-001",
        context_tokens: 1_000_000,
    },
];

/// Look up a provider profile by name.
pub fn provider_profile(name: &str) -> Option<&'static ProviderProfile> {
    PROFILES.iter().find(|p| p.name == name)
}
