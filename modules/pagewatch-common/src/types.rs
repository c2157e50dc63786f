use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Sources ---

/// A monitored URL. Created and deactivated by an external admin process;
/// read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub url: String,
    pub is_active: bool,
}

// --- Snapshots ---

/// One capture of a source's content at a point in time. Immutable; written
/// only by the external scraper. `content` is either a JSON-encoded object
/// carrying a `textContent` field or an opaque plain-text string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub url: String,
    pub content: String,
    pub captured_at: DateTime<Utc>,
}

// --- Changes ---

/// The structured diff payload stored on a change row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub summary: String,
}

/// A detected, significant transition between two snapshots of one source.
/// Diff fields are written by the summarizer; classification fields are
/// written exactly once, later, by the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: Uuid,
    pub source_id: Uuid,
    /// The older snapshot of the pair.
    pub snapshot_id1: Uuid,
    /// The newer snapshot of the pair.
    pub snapshot_id2: Uuid,
    pub diff: Diff,
    pub classification: Option<Classification>,
    pub explanation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Fields for inserting a new change row (diff stage only).
#[derive(Debug, Clone)]
pub struct NewChange {
    pub source_id: Uuid,
    pub snapshot_id1: Uuid,
    pub snapshot_id2: Uuid,
    pub diff: Diff,
}

// --- Classification ---

/// Closed vocabulary for classified changes. Anything else from the model
/// is rejected and the row stays unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Breaking,
    Security,
    Performance,
    NewFeature,
    MinorFix,
    Other,
}

impl Classification {
    pub const ALL: [Classification; 6] = [
        Classification::Breaking,
        Classification::Security,
        Classification::Performance,
        Classification::NewFeature,
        Classification::MinorFix,
        Classification::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Breaking => "breaking",
            Classification::Security => "security",
            Classification::Performance => "performance",
            Classification::NewFeature => "new_feature",
            Classification::MinorFix => "minor_fix",
            Classification::Other => "other",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "breaking" => Ok(Classification::Breaking),
            "security" => Ok(Classification::Security),
            "performance" => Ok(Classification::Performance),
            "new_feature" => Ok(Classification::NewFeature),
            "minor_fix" => Ok(Classification::MinorFix),
            "other" => Ok(Classification::Other),
            other => Err(format!("unknown classification: {other}")),
        }
    }
}
