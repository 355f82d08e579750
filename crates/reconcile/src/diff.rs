//! Diff computation between observed and desired state

use crate::field::{Field, FieldValue, Mutability};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const REDACTED: &str = "(sensitive)";

/// Minimal set of changed fields for an update call
///
/// Keys are ordered so the payload and the rendered plan are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDiff {
    changes: BTreeMap<&'static str, FieldValue>,
    sensitive: BTreeSet<&'static str>,
}

impl FieldDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// A diff carrying a single value (used for soft deletes).
    pub fn single(name: &'static str, value: FieldValue) -> Self {
        let mut diff = Self::new();
        diff.insert(name, value, false);
        diff
    }

    pub fn insert(&mut self, name: &'static str, value: FieldValue, sensitive: bool) {
        self.changes.insert(name, value);
        if sensitive {
            self.sensitive.insert(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.changes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.changes.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Names of the changed fields, in order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.changes.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.changes.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(name)
    }

    /// Render as a JSON object for the remote API.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.changes
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.to_json()))
            .collect()
    }
}

impl Serialize for FieldDiff {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(Some(self.changes.len()))?;
        for (name, value) in &self.changes {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .changes
            .iter()
            .map(|(name, value)| {
                if self.sensitive.contains(name) {
                    format!("{name} = {REDACTED}")
                } else {
                    format!("{name} = {value}")
                }
            })
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

/// Compute the update payload.
///
/// Only mutable fields that the desired state manages (`Some`) and whose
/// value differs from the observed one are included. Fields outside the
/// managed set never show up, whatever their observed value.
pub fn diff<S>(observed: &S, desired: &S, fields: &[Field<S>]) -> FieldDiff {
    let mut out = FieldDiff::new();
    for field in fields {
        if field.mutability != Mutability::Mutable {
            continue;
        }
        let Some(want) = field.value(desired) else {
            continue;
        };
        if field.value(observed).as_ref() != Some(&want) {
            out.insert(field.name, want, field.sensitive);
        }
    }
    out
}

/// Force-new fields whose desired value differs from the observed one.
///
/// A field the remote cannot read back (`None` in observed) never triggers
/// replacement on its own.
pub fn replacement_fields<S>(observed: &S, desired: &S, fields: &[Field<S>]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|f| f.mutability == Mutability::ForceNew)
        .filter(|f| match (f.value(observed), f.value(desired)) {
            (Some(have), Some(want)) => have != want,
            _ => false,
        })
        .map(|f| f.name)
        .collect()
}

/// Full payload of every managed mutable field, for remotes that replace
/// the whole object on update.
pub fn full_payload<S>(desired: &S, fields: &[Field<S>]) -> FieldDiff {
    let mut out = FieldDiff::new();
    for field in fields {
        if field.mutability != Mutability::Mutable {
            continue;
        }
        if let Some(value) = field.value(desired) {
            out.insert(field.name, value, field.sensitive);
        }
    }
    out
}

/// Whether observed state drifted away from the desired state.
pub fn drifted<S>(observed: &S, desired: &S, fields: &[Field<S>]) -> bool {
    !diff(observed, desired, fields).is_empty()
        || !replacement_fields(observed, desired, fields).is_empty()
}
