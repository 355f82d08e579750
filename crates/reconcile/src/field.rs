//! Field tables describing a resource's state
//!
//! Each resource type publishes a static table of [`Field`]s. The diff
//! engine walks the table instead of reflecting over the state struct, so
//! mutability and sensitivity are declared once, next to the accessor.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A comparable, serializable field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
    /// Unordered collection, compared as a set
    Set(BTreeSet<String>),
    /// Ordered collection
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl FieldValue {
    /// Build a set value from any string iterator.
    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a JSON value for request payloads.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Set(items) => items.iter().cloned().collect(),
            Self::List(items) => items.iter().cloned().collect(),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect::<serde_json::Map<_, _>>()
                .into(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Set(items) => {
                let items: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
            Self::Map(map) => {
                let pairs: Vec<String> = map.iter().map(|(k, v)| format!("{k} = {v:?}")).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<BTreeSet<String>> for FieldValue {
    fn from(value: BTreeSet<String>) -> Self {
        Self::Set(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, String>> for FieldValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Map(value)
    }
}

/// How a field may change over the entity's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Can be updated in place
    Mutable,
    /// A change requires destroying and recreating the entity
    ForceNew,
    /// Set by the remote, never sent
    Computed,
}

/// One entry of a resource's field table
pub struct Field<S> {
    pub name: &'static str,
    pub mutability: Mutability,
    /// Value is redacted in any rendered diff
    pub sensitive: bool,
    get: fn(&S) -> Option<FieldValue>,
    carry: Option<fn(&mut S, &S)>,
}

impl<S> Field<S> {
    pub const fn mutable(name: &'static str, get: fn(&S) -> Option<FieldValue>) -> Self {
        Self {
            name,
            mutability: Mutability::Mutable,
            sensitive: false,
            get,
            carry: None,
        }
    }

    pub const fn force_new(name: &'static str, get: fn(&S) -> Option<FieldValue>) -> Self {
        Self {
            name,
            mutability: Mutability::ForceNew,
            sensitive: false,
            get,
            carry: None,
        }
    }

    pub const fn computed(name: &'static str, get: fn(&S) -> Option<FieldValue>) -> Self {
        Self {
            name,
            mutability: Mutability::Computed,
            sensitive: false,
            get,
            carry: None,
        }
    }

    /// A mutable field the remote echoes back but that must not be printed.
    pub const fn secret(name: &'static str, get: fn(&S) -> Option<FieldValue>) -> Self {
        Self {
            name,
            mutability: Mutability::Mutable,
            sensitive: true,
            get,
            carry: None,
        }
    }

    /// A sensitive field the remote accepts but never returns.
    ///
    /// `carry` copies the last known value from one state into another so a
    /// fresh read does not report the field as drifted.
    pub const fn write_only(
        name: &'static str,
        get: fn(&S) -> Option<FieldValue>,
        carry: fn(&mut S, &S),
    ) -> Self {
        Self {
            name,
            mutability: Mutability::Mutable,
            sensitive: true,
            get,
            carry: Some(carry),
        }
    }

    /// Mark the field as force-new (chains after `write_only`).
    pub const fn replacing(mut self) -> Self {
        self.mutability = Mutability::ForceNew;
        self
    }

    /// Read the field from a state value.
    pub fn value(&self, state: &S) -> Option<FieldValue> {
        (self.get)(state)
    }

    pub fn is_write_only(&self) -> bool {
        self.carry.is_some()
    }

    /// Copy the field from `source` into `target` if it is write-only and
    /// `target` does not know it.
    pub fn carry_into(&self, target: &mut S, source: &S) {
        if let Some(carry) = self.carry
            && (self.get)(target).is_none()
        {
            carry(target, source);
        }
    }
}

impl<S> Clone for Field<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Field<S> {}

impl<S> fmt::Debug for Field<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("mutability", &self.mutability)
            .field("sensitive", &self.sensitive)
            .field("write_only", &self.carry.is_some())
            .finish()
    }
}

/// Copy every write-only field from `source` into `target`.
pub fn carry_write_only<S>(target: &mut S, source: &S, fields: &[Field<S>]) {
    for field in fields {
        field.carry_into(target, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Account {
        login: Option<String>,
        secret: Option<String>,
    }

    static FIELDS: [Field<Account>; 2] = [
        Field::force_new("login", |s: &Account| s.login.clone().map(FieldValue::from)),
        Field::write_only(
            "secret",
            |s: &Account| s.secret.clone().map(FieldValue::from),
            |t: &mut Account, s: &Account| t.secret.clone_from(&s.secret),
        ),
    ];

    #[test]
    fn test_set_equality_ignores_order() {
        let a = FieldValue::set(["b", "a"]);
        let b = FieldValue::set(["a", "b", "a"]);
        assert_eq!(a, b);
        assert_ne!(
            FieldValue::List(vec!["a".into(), "b".into()]),
            FieldValue::List(vec!["b".into(), "a".into()])
        );
    }

    #[test]
    fn test_to_json() {
        assert_eq!(FieldValue::from(30).to_json(), serde_json::json!(30));
        assert_eq!(
            FieldValue::set(["x@a.io", "y@a.io"]).to_json(),
            serde_json::json!(["x@a.io", "y@a.io"])
        );
        let map: BTreeMap<String, String> = [("k".to_string(), "v".to_string())].into();
        assert_eq!(FieldValue::from(map).to_json(), serde_json::json!({"k": "v"}));
    }

    #[test]
    fn test_carry_only_fills_missing() {
        let source = Account {
            login: Some("root".into()),
            secret: Some("hunter2".into()),
        };
        let mut fresh = Account {
            login: Some("root".into()),
            secret: None,
        };
        carry_write_only(&mut fresh, &source, &FIELDS);
        assert_eq!(fresh.secret.as_deref(), Some("hunter2"));

        let mut known = Account {
            login: None,
            secret: Some("new".into()),
        };
        carry_write_only(&mut known, &source, &FIELDS);
        assert_eq!(known.secret.as_deref(), Some("new"));
        assert_eq!(known.login, None);
    }

    #[test]
    fn test_field_flags() {
        assert_eq!(FIELDS[0].mutability, Mutability::ForceNew);
        assert!(!FIELDS[0].is_write_only());
        assert!(FIELDS[1].sensitive);
        assert!(FIELDS[1].is_write_only());
        let replacing = FIELDS[1].replacing();
        assert_eq!(replacing.mutability, Mutability::ForceNew);
    }
}
