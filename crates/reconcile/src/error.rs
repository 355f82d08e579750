//! Error types for reconciliation.
//!
//! Errors are categorized so the host can tell caller-input problems
//! (rejected before any remote call) apart from recoverable waits and
//! opaque remote failures.

use crate::adapter::AdapterError;
use crate::lifecycle::Phase;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle operation an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "read"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad identity, access level or field value supplied by the caller
    Input,
    /// Remote returned something the local tables do not know
    Warning,
    /// Desired state can only be reached by destroy + recreate
    Replacement,
    /// A deletion wait that can be resumed
    Recoverable,
    /// Opaque failure reported by the remote adapter
    Remote,
}

impl ErrorCategory {
    /// Whether the error should abort reconciliation of the entity.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Input | Self::Remote)
    }

    /// Whether the operation can be resumed without re-issuing mutations.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Whether the error should only be surfaced as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Input => "Invalid input",
            Self::Warning => "Unrecognized remote value",
            Self::Replacement => "Replacement required",
            Self::Recoverable => "Deletion not yet confirmed",
            Self::Remote => "Remote failure",
        }
    }
}

/// Errors produced by the reconciliation core.
#[derive(Debug, Error)]
pub enum Error {
    /// An identity part is empty or contains the reserved separator
    #[error("invalid identity component {component:?}: {reason}")]
    InvalidComponent {
        component: String,
        reason: &'static str,
    },

    /// A stored identity does not have the expected shape
    #[error("malformed identity {identity:?}: {reason}")]
    MalformedIdentity { identity: String, reason: String },

    /// Access level name outside the registered set
    #[error("unknown access level {name:?} (accepted: {})", .accepted.join(", "))]
    UnknownAccessLevel { name: String, accepted: Vec<String> },

    /// Access level code the registry does not know
    #[error("unrecognized access level code {code}")]
    UnrecognizedAccessCode { code: i64 },

    /// A desired field value failed validation
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Force-new fields differ, the entity has to be recreated
    #[error(
        "{kind} {identity} requires replacement: {} cannot change in place",
        .fields.join(", ")
    )]
    RequiresReplacement {
        kind: &'static str,
        identity: String,
        fields: Vec<&'static str>,
    },

    /// Operation not allowed from the instance's current phase
    #[error("cannot {operation} {kind} while it is {phase}")]
    InvalidTransition {
        kind: &'static str,
        operation: Operation,
        phase: Phase,
    },

    /// Deletion was not confirmed before the poll timeout
    #[error("timed out after {elapsed:?} waiting for {kind} {identity} to be deleted")]
    TimedOut {
        kind: &'static str,
        identity: String,
        elapsed: Duration,
    },

    /// Deletion wait was cancelled
    #[error("cancelled while waiting for {kind} {identity} to be deleted")]
    Cancelled { kind: &'static str, identity: String },

    /// A stored snapshot could not be decoded into the resource's state type
    #[error("corrupt snapshot for {address}: {message}")]
    Snapshot { address: String, message: String },

    /// Failure reported by the remote adapter, propagated unmodified
    #[error("{operation} {kind} {identity}: {source}")]
    Remote {
        kind: &'static str,
        operation: Operation,
        identity: String,
        #[source]
        source: AdapterError,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidComponent { .. }
            | Self::MalformedIdentity { .. }
            | Self::UnknownAccessLevel { .. }
            | Self::Validation { .. }
            | Self::InvalidTransition { .. }
            | Self::Snapshot { .. } => ErrorCategory::Input,
            Self::UnrecognizedAccessCode { .. } => ErrorCategory::Warning,
            Self::RequiresReplacement { .. } => ErrorCategory::Replacement,
            Self::TimedOut { .. } | Self::Cancelled { .. } => ErrorCategory::Recoverable,
            Self::Remote { .. } => ErrorCategory::Remote,
        }
    }

    /// Build a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The underlying adapter error, if this is a remote failure.
    pub fn adapter_error(&self) -> Option<&AdapterError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
