//! Remote adapter contract
//!
//! One adapter per resource type performs the actual remote calls. The
//! orchestrator only ever talks to the remote through this trait.

use crate::access::AccessLevelRegistry;
use crate::diff::FieldDiff;
use crate::error::Result;
use crate::field::{Field, FieldValue};
use crate::identity::{self, Identity};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

/// Failure reported by a remote adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The entity does not exist on the remote
    #[error("not found")]
    NotFound,

    /// Network or server-side failure
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The remote refused the request
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be decoded
    #[error("invalid response: {message}")]
    Decode { message: String },

    /// The request could not be built from the given state
    #[error("invalid request: {message}")]
    Request { message: String },

    /// The adapter does not support this operation
    #[error("{operation} is not supported")]
    Unsupported { operation: &'static str },
}

impl AdapterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether the deletion poller may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Result of a read: the state plus any non-fatal warnings
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<S> {
    pub state: S,
    pub warnings: Vec<String>,
}

impl<S> Observed<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            warnings: Vec::new(),
        }
    }

    pub fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Result of a create: the assigned identity and whatever the remote echoed
#[derive(Debug, Clone, PartialEq)]
pub struct Created<S> {
    pub identity: Identity,
    pub echo: Option<S>,
}

impl<S> Created<S> {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            echo: None,
        }
    }
}

/// How an entity is removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteMode {
    /// Issue a delete call
    Remove,
    /// The remote cannot remove the entity; set `field` to `value` instead
    Disable {
        field: &'static str,
        value: FieldValue,
    },
}

/// How an update payload is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStyle {
    /// Send only the changed fields
    Patch,
    /// Send every managed field whenever anything changed
    Replace,
}

/// Per-resource-type adapter to the remote API
pub trait RemoteAdapter: Send + Sync {
    /// Desired and observed state of this resource type
    type State: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Resource type name, e.g. "project_membership"
    fn kind(&self) -> &'static str;

    /// Field table used for diffing
    fn fields(&self) -> &'static [Field<Self::State>];

    /// Short human-readable description of a desired state
    fn describe(&self, state: &Self::State) -> String {
        format!("{} {state:?}", self.kind())
    }

    /// Number of parts in this type's identity
    fn identity_arity(&self) -> usize {
        1
    }

    /// Check that a stored or imported identity has the right shape.
    fn check_identity(&self, identity: &Identity) -> Result<()> {
        identity::decode(identity, self.identity_arity()).map(|_| ())
    }

    /// Validate a desired state before any remote call.
    fn validate(&self, _desired: &Self::State, _registry: &AccessLevelRegistry) -> Result<()> {
        Ok(())
    }

    fn create(
        &self,
        desired: &Self::State,
    ) -> std::result::Result<Created<Self::State>, AdapterError>;

    fn read(&self, identity: &Identity) -> std::result::Result<Observed<Self::State>, AdapterError>;

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> std::result::Result<Observed<Self::State>, AdapterError>;

    fn delete(&self, identity: &Identity) -> std::result::Result<(), AdapterError>;

    /// Whether the entity still exists. Used by the deletion poller.
    fn exists(&self, identity: &Identity) -> std::result::Result<bool, AdapterError> {
        match self.read(identity) {
            Ok(_) => Ok(true),
            Err(AdapterError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete_mode(&self) -> DeleteMode {
        DeleteMode::Remove
    }

    fn update_style(&self) -> UpdateStyle {
        UpdateStyle::Patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_only_transport() {
        assert!(AdapterError::transport("reset").is_retryable());
        assert!(!AdapterError::NotFound.is_retryable());
        assert!(
            !AdapterError::Rejected {
                status: 409,
                message: "conflict".into()
            }
            .is_retryable()
        );
        assert!(AdapterError::NotFound.is_not_found());
    }

    #[test]
    fn test_observed_warnings() {
        let observed = Observed::new(1).warn("unknown code 60");
        assert_eq!(observed.warnings, vec!["unknown code 60".to_string()]);
    }
}
