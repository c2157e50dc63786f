// Postgres persistence. Row types are internal; the rest of the crate sees
// only the domain types from pagewatch-common through the WatchStore trait.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use pagewatch_common::{
    Change, Classification, Diff, NewChange, PageWatchError, Snapshot, Source,
};

use crate::traits::WatchStore;

pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SourceRow {
    id: Uuid,
    url: String,
    is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    url: String,
    content: String,
    captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ChangeRow {
    id: Uuid,
    source_id: Uuid,
    snapshot_id1: Uuid,
    snapshot_id2: Uuid,
    diff: serde_json::Value,
    classification: Option<String>,
    explanation: Option<String>,
    timestamp: DateTime<Utc>,
}

impl From<SourceRow> for Source {
    fn from(r: SourceRow) -> Self {
        Source {
            id: r.id,
            url: r.url,
            is_active: r.is_active,
        }
    }
}

impl From<SnapshotRow> for Snapshot {
    fn from(r: SnapshotRow) -> Self {
        Snapshot {
            id: r.id,
            url: r.url,
            content: r.content,
            captured_at: r.captured_at,
        }
    }
}

impl ChangeRow {
    /// Convert to the domain type. Fails only when the stored diff payload
    /// does not carry a summary; an unrecognized classification string is
    /// downgraded to unclassified with a warning.
    fn into_change(self) -> Result<Change, PageWatchError> {
        let diff: Diff = serde_json::from_value(self.diff).map_err(|e| {
            PageWatchError::MalformedData(format!("change {} diff payload: {e}", self.id))
        })?;

        let classification = match self.classification.as_deref() {
            None => None,
            Some(raw) => match Classification::from_str(raw) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(change_id = %self.id, error = %e, "Ignoring stored classification");
                    None
                }
            },
        };

        Ok(Change {
            id: self.id,
            source_id: self.source_id,
            snapshot_id1: self.snapshot_id1,
            snapshot_id2: self.snapshot_id2,
            diff,
            classification,
            explanation: self.explanation,
            timestamp: self.timestamp,
        })
    }
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| PageWatchError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PageWatchError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl WatchStore for PgStore {
    async fn active_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT id, url, is_active FROM sources WHERE is_active = TRUE",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PageWatchError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Source::from).collect())
    }

    async fn source_urls(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT id, url, is_active FROM sources WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PageWatchError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|r| (r.id, r.url)).collect())
    }

    async fn latest_snapshots(&self, url: &str, limit: i64) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, url, content, captured_at
            FROM dom_snapshots
            WHERE url = $1
            ORDER BY captured_at DESC
            LIMIT $2
            "#,
        )
        .bind(url)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PageWatchError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Snapshot::from).collect())
    }

    async fn snapshots_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, url, content, captured_at FROM dom_snapshots WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PageWatchError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Snapshot::from).collect())
    }

    async fn latest_change_for_source(&self, source_id: Uuid) -> Result<Option<Change>> {
        let row = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, source_id, snapshot_id1, snapshot_id2,
                   diff, classification, explanation, timestamp
            FROM changes
            WHERE source_id = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PageWatchError::Database(e.to_string()))?;

        match row {
            None => Ok(None),
            Some(row) => match row.into_change() {
                Ok(change) => Ok(Some(change)),
                // A malformed prior diff only costs us the cross-run memory.
                Err(e) => {
                    warn!(%source_id, error = %e, "Skipping malformed prior change");
                    Ok(None)
                }
            },
        }
    }

    async fn change_exists(&self, snapshot_id1: Uuid, snapshot_id2: Uuid) -> bool {
        let result = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM changes WHERE snapshot_id1 = $1 AND snapshot_id2 = $2)",
        )
        .bind(snapshot_id1)
        .bind(snapshot_id2)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(exists) => exists,
            Err(e) => {
                warn!(%snapshot_id1, %snapshot_id2, error = %e,
                    "Duplicate check failed, treating pair as new");
                false
            }
        }
    }

    async fn insert_change(&self, change: NewChange) -> Result<Uuid> {
        let diff = serde_json::to_value(&change.diff)
            .map_err(|e| PageWatchError::MalformedData(e.to_string()))?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO changes (source_id, snapshot_id1, snapshot_id2, diff, timestamp)
            VALUES ($1, $2, $3, $4, now())
            RETURNING id
            "#,
        )
        .bind(change.source_id)
        .bind(change.snapshot_id1)
        .bind(change.snapshot_id2)
        .bind(&diff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PageWatchError::Database(e.to_string()))?;

        Ok(id)
    }

    async fn unclassified_changes(&self) -> Result<Vec<Change>> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, source_id, snapshot_id1, snapshot_id2,
                   diff, classification, explanation, timestamp
            FROM changes
            WHERE classification IS NULL
            ORDER BY timestamp ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PageWatchError::Database(e.to_string()))?;

        // Malformed rows are logged and dropped from the batch, not fatal.
        let mut changes = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_change() {
                Ok(change) => changes.push(change),
                Err(e) => warn!(error = %e, "Skipping malformed change row"),
            }
        }
        Ok(changes)
    }

    async fn set_classification(
        &self,
        id: Uuid,
        classification: Classification,
        explanation: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE changes SET classification = $2, explanation = $3 WHERE id = $1")
            .bind(id)
            .bind(classification.as_str())
            .bind(explanation)
            .execute(&self.pool)
            .await
            .map_err(|e| PageWatchError::Database(e.to_string()))?;

        Ok(())
    }
}
