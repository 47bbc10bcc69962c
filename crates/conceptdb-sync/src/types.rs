//! Sync records, reports, and status types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use conceptdb_core::Error;
use serde::{Deserialize, Serialize};

// ============================================================================
// Directions
// ============================================================================

/// Which way a sync cycle propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Rows to concepts.
    PreciseToSemantic,
    /// Concepts to coverage mappings.
    SemanticToPrecise,
    /// Both, with conflict resolution.
    Bidirectional,
}

impl SyncDirection {
    /// Whether the precise-to-semantic pass runs.
    pub fn precise_to_semantic(&self) -> bool {
        matches!(self, Self::PreciseToSemantic | Self::Bidirectional)
    }

    /// Whether the semantic-to-precise pass runs.
    pub fn semantic_to_precise(&self) -> bool {
        matches!(self, Self::SemanticToPrecise | Self::Bidirectional)
    }

    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreciseToSemantic => "precise_to_semantic",
            Self::SemanticToPrecise => "semantic_to_precise",
            Self::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "precise_to_semantic" | "p2s" => Ok(Self::PreciseToSemantic),
            "semantic_to_precise" | "s2p" => Ok(Self::SemanticToPrecise),
            "bidirectional" | "both" => Ok(Self::Bidirectional),
            other => Err(Error::invalid_data(format!("unknown sync direction '{other}'"))),
        }
    }
}

/// Direction of a single change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    /// Precise store to semantic store.
    PreciseToSemantic,
    /// Semantic store to precise store.
    SemanticToPrecise,
}

// ============================================================================
// Change log
// ============================================================================

/// What a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A semantic-side change reported to the manager; input to the next
    /// semantic-to-precise pass.
    Observed,
    /// Work the manager performed.
    Propagated,
    /// A conflict the manager resolved.
    Resolved,
}

/// Outcome of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ChangeOutcome {
    /// The change was applied.
    Success,
    /// The change failed.
    Error(String),
}

impl ChangeOutcome {
    /// Whether the change succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The logical entity a change refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Source table, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Source row id, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
    /// Concept id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<String>,
}

/// One audited unit of sync work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Direction.
    pub direction: ChangeDirection,
    /// Record kind.
    pub kind: ChangeKind,
    /// Affected entity.
    pub entity: EntityRef,
    /// When the change happened (for observed records, the reported
    /// update time).
    pub timestamp: DateTime<Utc>,
    /// Outcome.
    pub outcome: ChangeOutcome,
    /// Concept confidence, for concept-carrying records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A concept created or updated directly in the semantic store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptChange {
    /// Concept id in the semantic store.
    pub concept_id: String,
    /// Table the concept was derived from, if any.
    pub source_table: Option<String>,
    /// Row the concept was derived from, if any.
    pub source_row: Option<String>,
    /// Concept confidence.
    pub confidence: f64,
    /// When the concept changed.
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Checkpoints and reports
// ============================================================================

/// The "as of" marker written at the end of each completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint id.
    pub id: String,
    /// When the cycle started.
    pub as_of: DateTime<Utc>,
    /// Rows modified after this instant are changes for the next cycle.
    /// `None` until a precise-to-semantic pass has run.
    pub rows_since: Option<DateTime<Utc>>,
    /// Observed change records with `seq` at or above this are changes for
    /// the next cycle.
    pub change_seq: u64,
    /// When the cycle finished.
    pub completed_at: DateTime<Utc>,
    /// Cycle direction.
    pub direction: SyncDirection,
    /// Concepts upserted.
    pub precise_to_semantic: usize,
    /// Coverage mappings written.
    pub semantic_to_precise: usize,
    /// Conflicts resolved.
    pub conflicts_resolved: usize,
    /// Errors encountered.
    pub errors: usize,
}

/// A non-fatal error encountered during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    /// Table being processed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Error message.
    pub message: String,
}

impl SyncError {
    pub(crate) fn new(table: Option<&str>, error: impl fmt::Display) -> Self {
        Self {
            table: table.map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// How a sync call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The cycle ran to termination and wrote a checkpoint.
    Completed,
    /// Nothing changed; no work done, no checkpoint written.
    NoChanges,
    /// Another cycle is running; nothing done.
    InProgress,
}

/// Result of a sync call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// How the call ended.
    pub status: SyncStatus,
    /// Requested direction.
    pub direction: SyncDirection,
    /// Whether the call was forced.
    pub forced: bool,
    /// Concepts upserted into the semantic store.
    pub precise_to_semantic_count: usize,
    /// Coverage mappings written to the precise store.
    pub semantic_to_precise_count: usize,
    /// Conflicts resolved.
    pub conflicts_resolved: usize,
    /// Per-item errors.
    pub errors: Vec<SyncError>,
    /// Checkpoint written, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// When the call started.
    pub started_at: DateTime<Utc>,
    /// Call duration in milliseconds.
    pub duration_ms: u64,
}

impl SyncReport {
    pub(crate) fn empty(status: SyncStatus, direction: SyncDirection, forced: bool) -> Self {
        Self {
            status,
            direction,
            forced,
            precise_to_semantic_count: 0,
            semantic_to_precise_count: 0,
            conflicts_resolved: 0,
            errors: Vec::new(),
            checkpoint: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }
}

/// Snapshot of the sync manager's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncManagerStatus {
    /// When the last cycle completed.
    pub last_sync: Option<DateTime<Utc>>,
    /// Whether a cycle is running.
    pub in_progress: bool,
    /// Concepts plus mappings propagated since startup.
    pub total_synced: u64,
    /// Retained checkpoints.
    pub checkpoints: usize,
    /// Most recent checkpoint.
    pub current_checkpoint: Option<Checkpoint>,
    /// Retained change records.
    pub change_log_len: usize,
    /// Last five errors.
    pub recent_errors: Vec<SyncError>,
    /// Minimum confidence passed to concept extraction.
    pub extraction_min_confidence: f64,
    /// Whether periodic sync is active.
    pub scheduled: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_passes() {
        assert!(SyncDirection::Bidirectional.precise_to_semantic());
        assert!(SyncDirection::Bidirectional.semantic_to_precise());
        assert!(!SyncDirection::PreciseToSemantic.semantic_to_precise());
        assert!(!SyncDirection::SemanticToPrecise.precise_to_semantic());
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!(
            "precise-to-semantic".parse::<SyncDirection>().unwrap(),
            SyncDirection::PreciseToSemantic
        );
        assert_eq!("BOTH".parse::<SyncDirection>().unwrap(), SyncDirection::Bidirectional);
        assert!("sideways".parse::<SyncDirection>().is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let ok = serde_json::to_value(ChangeOutcome::Success).unwrap();
        assert_eq!(ok["status"], "success");
        let err = serde_json::to_value(ChangeOutcome::Error("boom".into())).unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["message"], "boom");
    }
}
