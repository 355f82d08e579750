//! One adapter per GitLab resource type
//!
//! Each module defines the resource's state (what a manifest declares and a
//! read observes), its static field table, and a [`reconcile::RemoteAdapter`]
//! over the [`Client`](crate::Client).

pub mod deploy_key;
pub mod group_variable;
mod integration;
pub mod membership;
pub mod project_badge;
pub mod project_cluster;
pub mod project_mirror;
pub mod service_github;
pub mod service_jira;
pub mod service_pipelines_email;
pub mod user;
pub mod user_custom_attribute;

use reconcile::{AdapterError, Error, FieldDiff};
use serde_json::{Map, Value};
use std::fmt::Display;

/// Every resource kind this crate can manage
pub const KINDS: [&str; 12] = [
    membership::PROJECT_KIND,
    membership::GROUP_KIND,
    group_variable::KIND,
    deploy_key::KIND,
    project_badge::KIND,
    project_mirror::KIND,
    project_cluster::KIND,
    service_github::KIND,
    service_jira::KIND,
    service_pipelines_email::KIND,
    user::KIND,
    user_custom_attribute::KIND,
];

/// Join path segments, percent-encoding each one.
///
/// Project and group paths such as `group/app` become `group%2Fapp`.
pub(crate) fn api_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Presence check used by `validate`.
pub(crate) fn required<'a, T>(value: &'a Option<T>, field: &str) -> reconcile::Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| Error::validation(field, "is required"))
}

/// Presence check used when building a request.
pub(crate) fn needed<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T, AdapterError> {
    value
        .as_ref()
        .ok_or_else(|| AdapterError::request(format!("{field} is required")))
}

/// Turn a malformed identity or bad input into a request error.
pub(crate) fn invalid(err: impl Display) -> AdapterError {
    AdapterError::request(err.to_string())
}

/// Request body holding every change under its own name, minus `skip`.
pub(crate) fn body_from(changes: &FieldDiff, skip: &[&str]) -> Map<String, Value> {
    changes
        .iter()
        .filter(|(name, _)| !skip.contains(name))
        .map(|(name, value)| (name.to_string(), value.to_json()))
        .collect()
}

/// Insert `value` under `key` when present.
pub(crate) fn put_opt<T: Into<Value>>(body: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        body.insert(key.to_string(), value.into());
    }
}

/// Read a boolean the API may encode as a JSON bool or a string.
pub(crate) fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a string the API may encode as a JSON string or number.
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whether `url` is an absolute http or https URL with a host.
pub(crate) fn is_http_url(url: &str) -> bool {
    ["https://", "http://"].iter().any(|scheme| {
        url.strip_prefix(scheme)
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::FieldValue;
    use serde_json::json;

    #[test]
    fn test_api_path_encodes_segments() {
        assert_eq!(
            api_path(&["projects", "group/app", "members", "7"]),
            "projects/group%2Fapp/members/7"
        );
        assert_eq!(
            api_path(&["groups", "42", "variables", "API_KEY"]),
            "groups/42/variables/API_KEY"
        );
    }

    #[test]
    fn test_body_from_skips_fields() {
        let mut changes = FieldDiff::new();
        changes.insert("project", FieldValue::from("42"), false);
        changes.insert("link_url", FieldValue::from("https://a.io"), false);
        let body = body_from(&changes, &["project"]);
        assert_eq!(Value::Object(body), json!({"link_url": "https://a.io"}));
    }

    #[test]
    fn test_loose_values() {
        assert_eq!(flag(Some(&json!(true))), Some(true));
        assert_eq!(flag(Some(&json!("false"))), Some(false));
        assert_eq!(flag(Some(&json!(1))), None);
        assert_eq!(flag(None), None);
        assert_eq!(text(Some(&json!(31))), Some("31".to_string()));
        assert_eq!(text(Some(&json!("31"))), Some("31".to_string()));
        assert_eq!(text(Some(&Value::Null)), None);
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://jira.example.com"));
        assert!(is_http_url("http://10.0.0.1:8080/jira"));
        assert!(!is_http_url("jira.example.com"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("ftp://jira.example.com"));
    }

    #[test]
    fn test_kinds_are_unique() {
        let mut kinds = KINDS.to_vec();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), KINDS.len());
    }
}
