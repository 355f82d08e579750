//! Shared plumbing for project integrations ("services")
//!
//! An integration is a singleton per project addressed by a slug. Setting it
//! is a PUT of the whole settings object; deleting it resets and
//! deactivates it, after which GitLab still answers reads with
//! `active: false`. An inactive integration is reported as not found.

use crate::client::Client;
use crate::resources::api_path;
use reconcile::{AdapterError, FieldDiff};
use serde::Deserialize;
use serde_json::{Map, Value};

pub(crate) fn path(project: &str, slug: &str) -> String {
    api_path(&["projects", project, "services", slug])
}

/// Read an integration, treating an inactive one as absent.
pub(crate) fn fetch(
    client: &Client,
    project: &str,
    slug: &str,
) -> Result<ApiIntegration, AdapterError> {
    let integration: ApiIntegration = client.get(&path(project, slug))?;
    if !integration.active {
        return Err(AdapterError::NotFound);
    }
    Ok(integration)
}

pub(crate) fn put(
    client: &Client,
    project: &str,
    slug: &str,
    body: Map<String, Value>,
) -> Result<(), AdapterError> {
    client.put_unit(&path(project, slug), &Value::Object(body))
}

pub(crate) fn remove(client: &Client, project: &str, slug: &str) -> Result<(), AdapterError> {
    client.delete(&path(project, slug))
}

/// Settings from a change set, without the project selector.
pub(crate) fn settings(changes: &FieldDiff) -> impl Iterator<Item = (&'static str, Value)> + '_ {
    changes
        .iter()
        .filter(|(name, _)| *name != "project")
        .map(|(name, value)| (name, value.to_json()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiIntegration {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub commit_events: Option<bool>,
    #[serde(default)]
    pub merge_requests_events: Option<bool>,
    #[serde(default)]
    pub comment_on_event_enabled: Option<bool>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ApiIntegration {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|v| !v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Method, MockBackend};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_inactive_integration_is_not_found() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "projects/42/services/github",
            json!({"id": 1, "title": "GitHub", "active": false, "properties": {}}),
        );
        let client = Client::with_backend(Arc::new(mock));
        assert!(fetch(&client, "42", "github").unwrap_err().is_not_found());
    }

    #[test]
    fn test_properties_skip_nulls() {
        let integration: ApiIntegration = serde_json::from_value(json!({
            "active": true,
            "properties": {"url": "https://jira.example.com", "username": null}
        }))
        .unwrap();
        assert_eq!(integration.property("url"), Some(&json!("https://jira.example.com")));
        assert_eq!(integration.property("username"), None);
    }
}
