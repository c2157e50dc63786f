//! Two-phase driver: diff every active source to completion, then classify
//! every unclassified change. No overlap; phase two only sees what phase
//! one committed.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ai_client::ChatCompleter;
use pagewatch_common::ProviderProfile;

use crate::classifier::ChangeClassifier;
use crate::differ::DiffSummarizer;
use crate::traits::WatchStore;

pub async fn run(
    store: Arc<dyn WatchStore>,
    completer: Arc<dyn ChatCompleter>,
    profile: ProviderProfile,
) -> Result<()> {
    let differ = DiffSummarizer::new(store.clone(), completer.clone(), profile.clone());
    let diff_stats = differ.run().await?;
    info!(%diff_stats, "Diff phase complete");

    let classifier = ChangeClassifier::new(store, completer, profile);
    let classify_stats = classifier.run().await?;
    info!(%classify_stats, "Classification phase complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{snapshot, source, MockStore, StubCompleter};
    use ai_client::{Completion, FinishReason};
    use chrono::{Duration, Utc};
    use pagewatch_common::Classification;

    fn profile() -> ProviderProfile {
        ProviderProfile {
            name: "stub",
            api_key_var: "STUB_KEY",
            base_url: None,
            diff_model: "stub-diff",
            classify_model: "stub-classify",
            context_tokens: 1_000_000,
        }
    }

    fn ok(content: &str) -> Result<Completion, String> {
        Ok(Completion {
            content: content.to_string(),
            finish_reason: FinishReason::Stop,
        })
    }

    #[tokio::test]
    async fn test_end_to_end_diff_then_classify() {
        let src = source("https://api.example.com/docs");
        let t = Utc::now();
        let s1 = snapshot(&src.url, r#"{"textContent":"v1 api"}"#, t);
        let s2 = snapshot(
            &src.url,
            r#"{"textContent":"v2 api, field X removed"}"#,
            t + Duration::days(1),
        );
        let store = Arc::new(
            MockStore::new()
                .with_source(src.clone())
                .with_snapshot(s1.clone())
                .with_snapshot(s2.clone()),
        );
        let completer = Arc::new(StubCompleter::scripted(vec![
            ok(r#"{"summary":"Field X removed from API"}"#),
            ok(r#"{"classification":"breaking","explanation":"removes a field"}"#),
        ]));

        run(store.clone(), completer.clone(), profile())
            .await
            .unwrap();

        // Exactly one change, correct ordered pair, classified in phase two
        // with the diff untouched.
        let inserted = store.inserted();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].snapshot_id1, s1.id);
        assert_eq!(inserted[0].snapshot_id2, s2.id);

        let pending = store.unclassified_changes().await.unwrap();
        assert!(pending.is_empty());

        let changes = store.source_changes(src.id);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].diff.summary, "Field X removed from API");
        assert_eq!(changes[0].classification, Some(Classification::Breaking));
        assert_eq!(changes[0].explanation.as_deref(), Some("removes a field"));

        // One diff call, one classify call.
        let calls = completer.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "stub-diff");
        assert_eq!(calls[0].temperature, Some(0.0));
        assert_eq!(calls[1].model, "stub-classify");
    }

    #[tokio::test]
    async fn test_rerun_with_no_new_snapshots_adds_nothing() {
        let src = source("https://example.com");
        let t = Utc::now();
        let store = Arc::new(
            MockStore::new()
                .with_source(src.clone())
                .with_snapshot(snapshot(&src.url, "a", t))
                .with_snapshot(snapshot(&src.url, "b", t + Duration::hours(1))),
        );
        let completer = Arc::new(StubCompleter::scripted(vec![
            ok(r#"{"summary":"Endpoint /v2 added"}"#),
            ok(r#"{"classification":"new_feature","explanation":"new endpoint"}"#),
            // Second run: diff call only; the duplicate guard stops the
            // insert and nothing is left to classify.
            ok(r#"{"summary":"Endpoint /v2 added"}"#),
        ]));

        run(store.clone(), completer.clone(), profile())
            .await
            .unwrap();
        run(store.clone(), completer.clone(), profile())
            .await
            .unwrap();

        assert_eq!(store.inserted().len(), 1);
        assert_eq!(completer.call_count(), 3);
    }
}
