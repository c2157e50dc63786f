// Test doubles for the pipeline.
//
// MockStore (WatchStore) — stateful in-memory store, builder-style setup.
// StubCompleter (ChatCompleter) — scripted or fixed completions, records
// every request it receives.
//
// No network, no database, no Docker.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ai_client::{ChatCompleter, Completion, CompletionRequest, FinishReason};
use pagewatch_common::{Change, Classification, Diff, NewChange, Snapshot, Source};

use crate::traits::WatchStore;

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

pub fn source(url: &str) -> Source {
    Source {
        id: Uuid::new_v4(),
        url: url.to_string(),
        is_active: true,
    }
}

pub fn snapshot(url: &str, content: &str, captured_at: DateTime<Utc>) -> Snapshot {
    Snapshot {
        id: Uuid::new_v4(),
        url: url.to_string(),
        content: content.to_string(),
        captured_at,
    }
}

pub fn change_row(source: &Source, older: &Snapshot, newer: &Snapshot, summary: &str) -> Change {
    Change {
        id: Uuid::new_v4(),
        source_id: source.id,
        snapshot_id1: older.id,
        snapshot_id2: newer.id,
        diff: Diff {
            summary: summary.to_string(),
        },
        classification: None,
        explanation: None,
        timestamp: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    sources: Vec<Source>,
    snapshots: Vec<Snapshot>,
    changes: Vec<Change>,
    inserted: Vec<NewChange>,
}

#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
    fail_duplicate_check: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, source: Source) -> Self {
        self.state.lock().unwrap().sources.push(source);
        self
    }

    pub fn with_snapshot(self, snapshot: Snapshot) -> Self {
        self.state.lock().unwrap().snapshots.push(snapshot);
        self
    }

    pub fn with_change(self, change: Change) -> Self {
        self.state.lock().unwrap().changes.push(change);
        self
    }

    /// Simulate a transient read failure in the duplicate guard.
    pub fn failing_duplicate_check(mut self) -> Self {
        self.fail_duplicate_check = true;
        self
    }

    /// Add a snapshot after construction (new scraper capture mid-test).
    pub fn add_snapshot(&self, snapshot: Snapshot) {
        self.state.lock().unwrap().snapshots.push(snapshot);
    }

    /// Every NewChange passed to insert_change, in order.
    pub fn inserted(&self) -> Vec<NewChange> {
        self.state.lock().unwrap().inserted.clone()
    }

    /// All change rows for a source, oldest first.
    pub fn source_changes(&self, source_id: Uuid) -> Vec<Change> {
        let mut changes: Vec<Change> = self
            .state
            .lock()
            .unwrap()
            .changes
            .iter()
            .filter(|c| c.source_id == source_id)
            .cloned()
            .collect();
        changes.sort_by_key(|c| c.timestamp);
        changes
    }

    pub fn change(&self, id: Uuid) -> Option<Change> {
        self.state
            .lock()
            .unwrap()
            .changes
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

#[async_trait]
impl WatchStore for MockStore {
    async fn active_sources(&self) -> Result<Vec<Source>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn source_urls(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| ids.contains(&s.id))
            .map(|s| (s.id, s.url.clone()))
            .collect())
    }

    async fn latest_snapshots(&self, url: &str, limit: i64) -> Result<Vec<Snapshot>> {
        let mut matching: Vec<Snapshot> = self
            .state
            .lock()
            .unwrap()
            .snapshots
            .iter()
            .filter(|s| s.url == url)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn snapshots_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Snapshot>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .snapshots
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn latest_change_for_source(&self, source_id: Uuid) -> Result<Option<Change>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .changes
            .iter()
            .filter(|c| c.source_id == source_id)
            .max_by_key(|c| c.timestamp)
            .cloned())
    }

    async fn change_exists(&self, snapshot_id1: Uuid, snapshot_id2: Uuid) -> bool {
        if self.fail_duplicate_check {
            // The contract on read failure: report "does not exist".
            return false;
        }
        self.state
            .lock()
            .unwrap()
            .changes
            .iter()
            .any(|c| c.snapshot_id1 == snapshot_id1 && c.snapshot_id2 == snapshot_id2)
    }

    async fn insert_change(&self, change: NewChange) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();
        state.inserted.push(change.clone());
        state.changes.push(Change {
            id,
            source_id: change.source_id,
            snapshot_id1: change.snapshot_id1,
            snapshot_id2: change.snapshot_id2,
            diff: change.diff,
            classification: None,
            explanation: None,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn unclassified_changes(&self) -> Result<Vec<Change>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .changes
            .iter()
            .filter(|c| c.classification.is_none())
            .cloned()
            .collect())
    }

    async fn set_classification(
        &self,
        id: Uuid,
        classification: Classification,
        explanation: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let change = state
            .changes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("MockStore: no change with id {id}"))?;
        change.classification = Some(classification);
        change.explanation = Some(explanation.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StubCompleter
// ---------------------------------------------------------------------------

enum Scripted {
    Ok(Completion),
    Err(String),
}

pub struct StubCompleter {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<Completion>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl StubCompleter {
    /// Answer every call with the same complete response.
    pub fn always(content: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(Completion {
                content: content.to_string(),
                finish_reason: FinishReason::Stop,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer calls in order from a script; error once the script runs out.
    pub fn scripted(responses: Vec<Result<Completion, String>>) -> Self {
        Self {
            script: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| match r {
                        Ok(c) => Scripted::Ok(c),
                        Err(e) => Scripted::Err(e),
                    })
                    .collect(),
            ),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompleter for StubCompleter {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return match scripted {
                Scripted::Ok(completion) => Ok(completion),
                Scripted::Err(message) => Err(anyhow!(message)),
            };
        }

        self.fallback
            .clone()
            .ok_or_else(|| anyhow!("StubCompleter: script exhausted"))
    }
}
