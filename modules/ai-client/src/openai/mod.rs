mod client;
pub(crate) mod schema;
pub(crate) mod types;

pub use schema::StructuredOutput;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::traits::{ChatCompleter, Completion, CompletionRequest, FinishReason};
use client::OpenAiHttpClient;

// =============================================================================
// OpenAi Client
// =============================================================================

/// Client for any OpenAI-compatible chat-completions endpoint. The base URL
/// is configurable, so OpenRouter and self-hosted gateways work unchanged.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    base_url: Option<String>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> OpenAiHttpClient {
        let client = OpenAiHttpClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl ChatCompleter for OpenAi {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let wire = types::ChatRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(types::WireMessage::from_message)
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .response_schema
                .clone()
                .map(types::ResponseFormat::json_schema),
        };

        let response = self.client().chat(&wire).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in completion response"))?;

        let finish_reason = choice
            .finish_reason
            .as_deref()
            .map(FinishReason::from_wire)
            .unwrap_or(FinishReason::Stop);

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
        })
    }
}
