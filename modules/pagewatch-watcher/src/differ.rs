//! Stage one: one LLM call per monitored source, summarizing what changed
//! between its two most recent snapshots.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ai_client::{
    strip_code_blocks, ChatCompleter, Completion, CompletionRequest, FinishReason, Message,
    StructuredOutput,
};
use pagewatch_common::{Diff, NewChange, ProviderProfile, Snapshot, Source};

use crate::budget::{char_budget, truncate_chars, PROMPT_OVERHEAD_CHARS};
use crate::normalize::normalize_content;
use crate::salvage::salvage_summary;
use crate::traits::WatchStore;

/// Stored when a length-limited response yields no recoverable text.
const TRUNCATED_PLACEHOLDER: &str = "Summary was truncated and could not be recovered.";

/// Stored when a complete response fails to parse as JSON.
const PARSE_ERROR_PLACEHOLDER: &str = "Failed to parse diff output from model.";

const DIFF_SYSTEM_PROMPT: &str = r#"You compare two versions of a monitored web page and report what changed.

Rules for the summary:
- At most 500 words. Never exceed 2000 characters.
- Describe each change once. Do not repeat yourself or restate the same change in different words.
- Plain factual language, no filler."#;

/// What the LLM returns for one snapshot pair.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiffSummary {
    pub summary: String,
}

fn build_diff_prompt(url: &str, prior_summary: &str, old_text: &str, new_text: &str) -> String {
    format!(
        r#"Compare the two versions of the page at {url} below and summarize the meaningful differences.

Previously reported for this page (already known, do NOT repeat any of it):
{prior}

Significant changes, in priority order (this page may document an API):
- Breaking changes
- Security updates
- Performance updates
- New features, options, or models
- Date, support window, or deprecation changes
- Fields renamed or removed
- Endpoints added or removed

Ignore pure formatting or whitespace differences, "last updated" timestamps, and promotional or marketing content.

If there is nothing significant, set the summary to exactly: No significant changes detected.

OLD VERSION:
{old_text}

NEW VERSION:
{new_text}

Respond with a JSON object with exactly one field "summary" containing the summary string."#,
        prior = if prior_summary.is_empty() {
            "(nothing reported yet)"
        } else {
            prior_summary
        },
    )
}

/// True when a summary should not be stored: empty, or the model's
/// no-change sentinel (matched case-insensitively).
fn is_insignificant(summary: &str) -> bool {
    summary.trim().is_empty()
        || summary.to_lowercase().contains("no significant changes")
}

/// Extract the summary text from a completion. Length-limited responses go
/// through the salvage path; unparseable complete responses degrade to a
/// placeholder instead of failing the source.
fn extract_summary(completion: &Completion) -> String {
    if completion.finish_reason == FinishReason::Length {
        warn!("Diff response hit the length limit, salvaging partial summary");
        return salvage_summary(&completion.content)
            .unwrap_or_else(|| TRUNCATED_PLACEHOLDER.to_string());
    }

    match serde_json::from_str::<DiffSummary>(strip_code_blocks(&completion.content)) {
        Ok(diff) => diff.summary,
        Err(e) => {
            warn!(error = %e, "Diff response was not valid JSON, storing placeholder");
            PARSE_ERROR_PLACEHOLDER.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Run stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffStats {
    pub sources: usize,
    pub stored: usize,
    pub skipped_few_snapshots: usize,
    pub skipped_insignificant: usize,
    pub skipped_duplicate: usize,
    pub failures: usize,
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sources: {} stored, {} <2 snapshots, {} insignificant, {} duplicate, {} failed",
            self.sources,
            self.stored,
            self.skipped_few_snapshots,
            self.skipped_insignificant,
            self.skipped_duplicate,
            self.failures
        )
    }
}

enum SourceOutcome {
    Stored,
    FewSnapshots,
    Insignificant,
    Duplicate,
}

// ---------------------------------------------------------------------------
// DiffSummarizer
// ---------------------------------------------------------------------------

pub struct DiffSummarizer {
    store: Arc<dyn WatchStore>,
    completer: Arc<dyn ChatCompleter>,
    profile: ProviderProfile,
}

impl DiffSummarizer {
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

    /// Process every active source. Per-source failures are contained and
    /// counted; only the initial source listing can fail the run.
    pub async fn run(&self) -> Result<DiffStats> {
        let sources = self.store.active_sources().await?;
        info!(count = sources.len(), "Diffing active sources");

        let mut stats = DiffStats {
            sources: sources.len(),
            ..DiffStats::default()
        };

        for source in &sources {
            match self.process_source(source).await {
                Ok(SourceOutcome::Stored) => stats.stored += 1,
                Ok(SourceOutcome::FewSnapshots) => stats.skipped_few_snapshots += 1,
                Ok(SourceOutcome::Insignificant) => stats.skipped_insignificant += 1,
                Ok(SourceOutcome::Duplicate) => stats.skipped_duplicate += 1,
                Err(e) => {
                    error!(url = %source.url, error = %e, "Failed to diff source");
                    stats.failures += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn process_source(&self, source: &Source) -> Result<SourceOutcome> {
        let snapshots = self.store.latest_snapshots(&source.url, 2).await?;
        if snapshots.len() < 2 {
            debug!(url = %source.url, count = snapshots.len(), "Fewer than two snapshots, skipping");
            return Ok(SourceOutcome::FewSnapshots);
        }
        let newer = &snapshots[0];
        let older = &snapshots[1];

        let prior_summary = self
            .store
            .latest_change_for_source(source.id)
            .await?
            .map(|c| c.diff.summary)
            .unwrap_or_default();

        let summary = self
            .summarize_pair(&source.url, &prior_summary, older, newer)
            .await?;

        if is_insignificant(&summary) {
            debug!(url = %source.url, "No significant changes");
            return Ok(SourceOutcome::Insignificant);
        }

        if self.store.change_exists(older.id, newer.id).await {
            debug!(url = %source.url, "Change already recorded for this snapshot pair");
            return Ok(SourceOutcome::Duplicate);
        }

        let id = self
            .store
            .insert_change(NewChange {
                source_id: source.id,
                snapshot_id1: older.id,
                snapshot_id2: newer.id,
                diff: Diff { summary },
            })
            .await?;

        info!(url = %source.url, change_id = %id, "Recorded change");
        Ok(SourceOutcome::Stored)
    }

    /// Normalize, budget, prompt, and parse one snapshot pair.
    async fn summarize_pair(
        &self,
        url: &str,
        prior_summary: &str,
        older: &Snapshot,
        newer: &Snapshot,
    ) -> Result<String> {
        let old_text = normalize_content(&older.content);
        let new_text = normalize_content(&newer.content);

        let max_chars = char_budget(self.profile.context_tokens, PROMPT_OVERHEAD_CHARS);
        if old_text.chars().count() > max_chars || new_text.chars().count() > max_chars {
            warn!(url, max_chars, "Snapshot text exceeds context budget, head-truncating");
        }
        let old_text = truncate_chars(&old_text, max_chars);
        let new_text = truncate_chars(&new_text, max_chars);

        let request = CompletionRequest::new(
            self.profile.diff_model,
            vec![
                Message::system(DIFF_SYSTEM_PROMPT),
                Message::user(build_diff_prompt(url, prior_summary, old_text, new_text)),
            ],
        )
        .temperature(0.0)
        .response_schema(DiffSummary::response_schema());

        let completion = self.completer.complete(&request).await?;
        Ok(extract_summary(&completion))
    }

    /// Diagnostic dry run against an explicit snapshot pair: every step is
    /// logged, nothing is written.
    pub async fn diagnose_pair(&self, id1: Uuid, id2: Uuid) -> Result<()> {
        let snapshots = self.store.snapshots_by_ids(&[id1, id2]).await?;
        let mut by_time: Vec<Snapshot> = snapshots;
        if by_time.len() != 2 {
            return Err(anyhow!(
                "expected 2 snapshots, found {} for ids {id1}, {id2}",
                by_time.len()
            ));
        }
        by_time.sort_by_key(|s| s.captured_at);
        let (older, newer) = (&by_time[0], &by_time[1]);

        if older.url != newer.url {
            warn!(older = %older.url, newer = %newer.url, "Snapshots are from different urls");
        }
        info!(url = %newer.url, older_id = %older.id, newer_id = %newer.id,
            older_at = %older.captured_at, newer_at = %newer.captured_at, "Diffing snapshot pair");

        let old_text = normalize_content(&older.content);
        let new_text = normalize_content(&newer.content);
        info!(old_chars = old_text.chars().count(), new_chars = new_text.chars().count(),
            "Normalized snapshot contents");

        let max_chars = char_budget(self.profile.context_tokens, PROMPT_OVERHEAD_CHARS);
        info!(max_chars, model = self.profile.diff_model, "Context budget");

        let summary = self
            .summarize_pair(&newer.url, "", older, newer)
            .await?;
        info!(summary = %summary, "Model summary");

        if is_insignificant(&summary) {
            info!("Verdict: insignificant, would not be stored");
            return Ok(());
        }

        if self.store.change_exists(older.id, newer.id).await {
            info!("Verdict: significant, but a change already exists for this pair");
        } else {
            info!("Verdict: significant, a run would insert a change row (dry run, not inserting)");
        }
        Ok(())
    }
}
