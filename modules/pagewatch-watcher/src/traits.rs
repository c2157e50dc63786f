// Trait abstraction for the pipeline's persistence dependency.
//
// WatchStore is the one seam between the two LLM stages and Postgres.
// It enables deterministic testing with an in-memory store: no network,
// no database, no Docker.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use pagewatch_common::{Change, Classification, NewChange, Snapshot, Source};

#[async_trait]
pub trait WatchStore: Send + Sync {
    // --- Sources ---

    /// All sources currently flagged active.
    async fn active_sources(&self) -> Result<Vec<Source>>;

    /// Batch-resolve source ids to urls. One query for the distinct set.
    async fn source_urls(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>>;

    // --- Snapshots ---

    /// The most recent snapshots for a url, newest first.
    async fn latest_snapshots(&self, url: &str, limit: i64) -> Result<Vec<Snapshot>>;

    /// Fetch specific snapshots by id (diagnostic pair runs).
    async fn snapshots_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Snapshot>>;

    // --- Changes ---

    /// The most recent change for a source, if any. Its summary is the
    /// cross-run memory fed back into the diff prompt.
    async fn latest_change_for_source(&self, source_id: Uuid) -> Result<Option<Change>>;

    /// Duplicate guard: does a change row already exist for this exact
    /// ordered snapshot pair? A failed read answers `false` — a transient
    /// read error must not suppress a legitimate change record, so the
    /// bias is at-least-once.
    async fn change_exists(&self, snapshot_id1: Uuid, snapshot_id2: Uuid) -> bool;

    /// Insert a freshly detected change (diff fields only).
    async fn insert_change(&self, change: NewChange) -> Result<Uuid>;

    /// All changes with no classification yet.
    async fn unclassified_changes(&self) -> Result<Vec<Change>>;

    /// Set classification and explanation together on one row.
    async fn set_classification(
        &self,
        id: Uuid,
        classification: Classification,
        explanation: &str,
    ) -> Result<()>;
}
