//! Identity codec for remote entities.
//!
//! Simple resources are addressed by their own primary key. Composite
//! sub-resources (a membership, a variable, a badge) only exist inside a
//! parent, so their identity joins the parent key and the child key with
//! [`SEPARATOR`]. The parent can be recovered from the identity alone.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved separator between identity parts.
pub const SEPARATOR: char = ':';

/// Opaque token addressing one remote entity for its whole lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a raw identity string (a stored or imported value).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into exactly `arity` parts.
    pub fn parts(&self, arity: usize) -> Result<Vec<String>> {
        decode(self, arity)
    }

    /// Parse one part of an `arity`-part identity as a number.
    pub fn numeric_part<T: FromStr>(&self, arity: usize, index: usize) -> Result<T> {
        let parts = decode(self, arity)?;
        let part = parts.get(index).ok_or_else(|| Error::MalformedIdentity {
            identity: self.0.clone(),
            reason: format!("no part at position {index}"),
        })?;
        part.parse().map_err(|_| Error::MalformedIdentity {
            identity: self.0.clone(),
            reason: format!("part {} ({part:?}) is not a number", index + 1),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Check that a value can be used as one identity part.
pub fn check_component(component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::InvalidComponent {
            component: component.to_string(),
            reason: "empty",
        });
    }
    if component.contains(SEPARATOR) {
        return Err(Error::InvalidComponent {
            component: component.to_string(),
            reason: "contains the ':' separator",
        });
    }
    Ok(())
}

/// Encode ordered parts into an identity.
pub fn encode<S: AsRef<str>>(parts: &[S]) -> Result<Identity> {
    if parts.is_empty() {
        return Err(Error::InvalidComponent {
            component: String::new(),
            reason: "no components",
        });
    }
    for part in parts {
        check_component(part.as_ref())?;
    }
    let joined: Vec<&str> = parts.iter().map(AsRef::as_ref).collect();
    Ok(Identity(joined.join(&SEPARATOR.to_string())))
}

/// Decode an identity into exactly `arity` parts.
pub fn decode(identity: &Identity, arity: usize) -> Result<Vec<String>> {
    let parts: Vec<&str> = identity.0.split(SEPARATOR).collect();
    if parts.len() != arity {
        return Err(Error::MalformedIdentity {
            identity: identity.0.clone(),
            reason: format!("expected {arity} parts, found {}", parts.len()),
        });
    }
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::MalformedIdentity {
            identity: identity.0.clone(),
            reason: "empty part".to_string(),
        });
    }
    Ok(parts.into_iter().map(String::from).collect())
}

/// Encode a `parent:child` identity.
pub fn encode_pair(parent: &str, child: &str) -> Result<Identity> {
    encode(&[parent, child])
}

/// Decode a `parent:child` identity.
pub fn decode_pair(identity: &Identity) -> Result<(String, String)> {
    let [parent, child]: [String; 2] =
        decode(identity, 2)?
            .try_into()
            .map_err(|_| Error::MalformedIdentity {
                identity: identity.0.clone(),
                reason: "expected 2 parts".to_string(),
            })?;
    Ok((parent, child))
}
