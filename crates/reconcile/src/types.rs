//! Core types for planning and applying changes

use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Change a resource needs to reach its desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Change {
    /// Already converged
    NoOp,
    /// Not present remotely
    Create,
    /// Present, some mutable fields differ
    Update {
        fields: Vec<String>,
        /// Rendered diff, sensitive values redacted
        detail: String,
    },
    /// Force-new fields differ: delete, then create
    Replace { fields: Vec<String> },
    /// Tracked but no longer declared
    Delete,
    /// Tracked, not declared, and already gone remotely
    Forget,
    /// Current state could not be determined
    Unknown { error: String },
}

impl Change {
    /// Whether applying this change does anything.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp | Self::Unknown { .. })
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Delete | Self::Replace { .. })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Update { .. } => "~",
            Self::Replace { .. } => "-/+",
            Self::Delete => "-",
            Self::Forget => "x",
            Self::Unknown { .. } => "?",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => write!(f, "no changes"),
            Self::Create => write!(f, "create"),
            Self::Update { detail, .. } => write!(f, "update ({detail})"),
            Self::Replace { fields } => {
                write!(f, "replace ({} cannot change in place)", fields.join(", "))
            }
            Self::Delete => write!(f, "delete"),
            Self::Forget => write!(f, "forget (already gone)"),
            Self::Unknown { error } => write!(f, "unknown: {error}"),
        }
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was updated in place
    Modified,
    /// Resource was deleted and recreated
    Replaced,
    /// Resource was removed (or dropped from tracking)
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::Replaced | Self::Removed
        )
    }
}

/// Persisted record of one managed entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: String,
    pub identity: Identity,
    /// Last observed state, if it was read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<serde_json::Value>,
}

/// What the caller should do with the stored snapshot after an operation
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotUpdate {
    Keep,
    Set(Snapshot),
    Remove,
}

/// Apply result plus the snapshot change it implies
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub result: ApplyResult,
    pub snapshot: SnapshotUpdate,
}

impl Applied {
    pub fn new(result: ApplyResult, snapshot: SnapshotUpdate) -> Self {
        Self { result, snapshot }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            result: ApplyResult::Skipped {
                reason: reason.into(),
            },
            snapshot: SnapshotUpdate::Keep,
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub replaced: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.replaced + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.replaced += other.replaced;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of resources reconciled in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}
