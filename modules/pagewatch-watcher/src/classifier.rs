//! Stage two: one LLM call per stored-but-unclassified diff, assigning one
//! of the six closed-vocabulary labels plus an explanation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use ai_client::{strip_code_blocks, ChatCompleter, CompletionRequest, Message, StructuredOutput};
use pagewatch_common::{Change, Classification, ProviderProfile};

use crate::traits::WatchStore;

const CLASSIFY_MAX_TOKENS: u32 = 1000;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You classify detected changes to monitored web pages.

Pick exactly one classification:
- breaking: removes or renames something consumers depend on, or changes behavior incompatibly
- security: security fixes, advisories, auth or permission changes
- performance: speed, latency, quota, or rate-limit improvements
- new_feature: new endpoints, options, models, or capabilities
- minor_fix: small corrections with no compatibility impact
- other: anything that fits none of the above"#;

/// The schema the model must fill. Classification is the closed enum, so
/// strict structured output already constrains the vocabulary; the raw
/// string is still validated after parsing in case the provider ignores
/// the schema.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ChangeClassification {
    pub classification: Classification,
    pub explanation: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawClassification {
    #[serde(default)]
    classification: String,
    #[serde(default)]
    explanation: String,
}

fn build_classify_prompt(url: &str, summary: &str) -> String {
    format!(
        r#"A monitored page changed.

Page: {url}

Detected change:
{summary}

Respond with a JSON object with exactly two fields: "classification" (one of: breaking, security, performance, new_feature, minor_fix, other) and "explanation" (one or two sentences on why)."#
    )
}

// ---------------------------------------------------------------------------
// Run stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassifyStats {
    pub pending: usize,
    pub classified: usize,
    pub skipped_invalid: usize,
    pub failures: usize,
}

impl fmt::Display for ClassifyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pending: {} classified, {} invalid, {} failed",
            self.pending, self.classified, self.skipped_invalid, self.failures
        )
    }
}

// ---------------------------------------------------------------------------
// ChangeClassifier
// ---------------------------------------------------------------------------

pub struct ChangeClassifier {
    store: Arc<dyn WatchStore>,
    completer: Arc<dyn ChatCompleter>,
    profile: ProviderProfile,
}

impl ChangeClassifier {
    pub fn new(
        store: Arc<dyn WatchStore>,
        completer: Arc<dyn ChatCompleter>,
        profile: ProviderProfile,
    ) -> Self {
        Self {
            store,
            completer,
            profile,
        }
    }

    /// Classify every pending change. Per-row failures are contained and
    /// counted; only the initial listing and url lookup can fail the run.
    pub async fn run(&self) -> Result<ClassifyStats> {
        let pending = self.store.unclassified_changes().await?;
        if pending.is_empty() {
            info!("No unclassified changes");
            return Ok(ClassifyStats::default());
        }
        info!(count = pending.len(), "Classifying changes");

        let mut source_ids: Vec<Uuid> = pending.iter().map(|c| c.source_id).collect();
        source_ids.sort();
        source_ids.dedup();
        let urls = self.store.source_urls(&source_ids).await?;

        let mut stats = ClassifyStats {
            pending: pending.len(),
            ..ClassifyStats::default()
        };

        for change in &pending {
            match self.classify_one(change, &urls).await {
                Ok(true) => stats.classified += 1,
                Ok(false) => stats.skipped_invalid += 1,
                Err(e) => {
                    error!(change_id = %change.id, error = %e, "Failed to classify change");
                    stats.failures += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Returns Ok(true) when the row was classified, Ok(false) when it was
    /// skipped as invalid (malformed diff, bad model output).
    async fn classify_one(&self, change: &Change, urls: &HashMap<Uuid, String>) -> Result<bool> {
        if change.diff.summary.trim().is_empty() {
            warn!(change_id = %change.id, "Change has an empty diff summary, skipping");
            return Ok(false);
        }

        let url = urls
            .get(&change.source_id)
            .map(String::as_str)
            .unwrap_or("unknown");

        let request = CompletionRequest::new(
            self.profile.classify_model,
            vec![
                Message::system(CLASSIFY_SYSTEM_PROMPT),
                Message::user(build_classify_prompt(url, &change.diff.summary)),
            ],
        )
        .max_tokens(CLASSIFY_MAX_TOKENS)
        .response_schema(ChangeClassification::response_schema());

        let completion = self.completer.complete(&request).await?;

        let raw: RawClassification =
            match serde_json::from_str(strip_code_blocks(&completion.content)) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(change_id = %change.id, error = %e,
                        "Classification response was not valid JSON, skipping");
                    return Ok(false);
                }
            };

        let classification = match Classification::from_str(&raw.classification) {
            Ok(c) => c,
            Err(e) => {
                warn!(change_id = %change.id, error = %e,
                    "Classification outside the closed vocabulary, skipping");
                return Ok(false);
            }
        };

        if raw.explanation.trim().is_empty() {
            warn!(change_id = %change.id, "Classification response missing explanation, skipping");
            return Ok(false);
        }

        self.store
            .set_classification(change.id, classification, &raw.explanation)
            .await?;

        info!(change_id = %change.id, %classification, "Classified change");
        Ok(true)
    }
}
