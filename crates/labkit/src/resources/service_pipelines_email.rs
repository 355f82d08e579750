//! Pipeline status emails
//!
//! Recipients are a set. GitLab stores them as one comma-separated string.

use crate::client::Client;
use crate::resources::integration::{self, ApiIntegration};
use crate::resources::{flag, invalid, needed, required, text};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, UpdateStyle, encode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const KIND: &str = "service_pipelines_email";
const SLUG: &str = "pipelines-email";

pub const BRANCH_FILTERS: [&str; 4] = ["all", "default", "protected", "default_and_protected"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelinesEmailService {
    pub project: Option<String>,
    pub recipients: Option<BTreeSet<String>>,
    pub notify_only_broken_pipelines: Option<bool>,
    /// One of `all`, `default`, `protected`, `default_and_protected`
    pub branches_to_be_notified: Option<String>,
}

static FIELDS: [Field<PipelinesEmailService>; 4] = [
    Field::force_new("project", |s: &PipelinesEmailService| {
        s.project.clone().map(FieldValue::from)
    }),
    Field::mutable("recipients", |s: &PipelinesEmailService| {
        s.recipients.clone().map(FieldValue::from)
    }),
    Field::mutable("notify_only_broken_pipelines", |s: &PipelinesEmailService| {
        s.notify_only_broken_pipelines.map(FieldValue::from)
    }),
    Field::mutable("branches_to_be_notified", |s: &PipelinesEmailService| {
        s.branches_to_be_notified
            .as_deref()
            .map(|b| FieldValue::from(b.to_ascii_lowercase()))
    }),
];

fn split_recipients(joined: &str) -> BTreeSet<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}

fn join_recipients<'a>(recipients: impl IntoIterator<Item = &'a String>) -> String {
    recipients
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Adapter for `service_pipelines_email`
pub struct PipelinesEmailServiceAdapter {
    client: Client,
}

impl PipelinesEmailServiceAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn observe(project: String, integration: &ApiIntegration) -> PipelinesEmailService {
        PipelinesEmailService {
            project: Some(project),
            recipients: text(integration.property("recipients")).map(|r| split_recipients(&r)),
            notify_only_broken_pipelines: flag(
                integration.property("notify_only_broken_pipelines"),
            ),
            branches_to_be_notified: text(integration.property("branches_to_be_notified")),
        }
    }
}

impl RemoteAdapter for PipelinesEmailServiceAdapter {
    type State = PipelinesEmailService;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<PipelinesEmailService>] {
        &FIELDS
    }

    fn describe(&self, state: &PipelinesEmailService) -> String {
        format!(
            "pipeline emails of project {} to {} recipient(s)",
            state.project.as_deref().unwrap_or("?"),
            state.recipients.as_ref().map_or(0, BTreeSet::len)
        )
    }

    fn validate(
        &self,
        desired: &PipelinesEmailService,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.project, "project")?)?;
        let recipients = required(&desired.recipients, "recipients")?;
        if recipients.is_empty() {
            return Err(Error::validation("recipients", "must name at least one address"));
        }
        if let Some(bad) = recipients.iter().find(|r| r.contains(',') || r.trim().is_empty()) {
            return Err(Error::validation("recipients", format!("{bad:?} is not a single address")));
        }
        if let Some(branches) = &desired.branches_to_be_notified
            && !BRANCH_FILTERS.contains(&branches.to_ascii_lowercase().as_str())
        {
            return Err(Error::validation(
                "branches_to_be_notified",
                format!("{branches:?} is not one of {}", BRANCH_FILTERS.join(", ")),
            ));
        }
        Ok(())
    }

    fn create(
        &self,
        desired: &PipelinesEmailService,
    ) -> Result<Created<PipelinesEmailService>, AdapterError> {
        let project = needed(&desired.project, "project")?;
        let mut body = Map::new();
        body.insert(
            "recipients".into(),
            join_recipients(needed(&desired.recipients, "recipients")?).into(),
        );
        body.insert(
            "notify_only_broken_pipelines".into(),
            desired.notify_only_broken_pipelines.unwrap_or(true).into(),
        );
        body.insert(
            "branches_to_be_notified".into(),
            desired
                .branches_to_be_notified
                .as_deref()
                .unwrap_or("default")
                .to_ascii_lowercase()
                .into(),
        );

        integration::put(&self.client, project, SLUG, body)?;
        Ok(Created::new(encode(&[project]).map_err(invalid)?))
    }

    fn read(&self, identity: &Identity) -> Result<Observed<PipelinesEmailService>, AdapterError> {
        let project = identity.as_str().to_string();
        let integration = integration::fetch(&self.client, &project, SLUG)?;
        Ok(Observed::new(Self::observe(project, &integration)))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<PipelinesEmailService>, AdapterError> {
        let body = integration::settings(changes)
            .map(|(name, value)| {
                let value = match (name, changes.get(name)) {
                    ("recipients", Some(FieldValue::Set(recipients))) => {
                        Value::String(join_recipients(recipients))
                    }
                    _ => value,
                };
                (name.to_string(), value)
            })
            .collect();
        integration::put(&self.client, identity.as_str(), SLUG, body)?;
        self.read(identity)
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        integration::remove(&self.client, identity.as_str(), SLUG)
    }

    fn update_style(&self) -> UpdateStyle {
        UpdateStyle::Replace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Method, MockBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn adapter(mock: &MockBackend) -> PipelinesEmailServiceAdapter {
        PipelinesEmailServiceAdapter::new(Client::with_backend(Arc::new(mock.clone())))
    }

    fn recipients(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|r| (*r).to_string()).collect()
    }

    fn emails() -> PipelinesEmailService {
        PipelinesEmailService {
            project: Some("42".into()),
            recipients: Some(recipients(&["ops@acme.io", "dev@acme.io"])),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_joins_recipients() {
        let mock = MockBackend::new();
        adapter(&mock).create(&emails()).unwrap();
        assert_eq!(
            mock.last_body(Method::Put),
            Some(json!({"recipients": "dev@acme.io,ops@acme.io",
                        "notify_only_broken_pipelines": true,
                        "branches_to_be_notified": "default"}))
        );
    }

    #[test]
    fn test_recipient_order_is_not_drift() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "projects/42/services/pipelines-email",
            json!({"active": true, "properties": {
                "recipients": "ops@acme.io, dev@acme.io",
                "notify_only_broken_pipelines": "true",
                "branches_to_be_notified": "default"
            }}),
        );
        let state = adapter(&mock).read(&Identity::new("42")).unwrap().state;
        assert_eq!(state.notify_only_broken_pipelines, Some(true));
        assert!(reconcile::diff(&state, &emails(), &FIELDS).is_empty());
    }

    #[test]
    fn test_update_joins_recipients() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "projects/42/services/pipelines-email",
            json!({"active": true, "properties": {"recipients": "ops@acme.io"}}),
        );
        let mut changes = FieldDiff::new();
        changes.insert("recipients", FieldValue::set(["ops@acme.io"]), false);
        changes.insert("branches_to_be_notified", FieldValue::from("all"), false);
        adapter(&mock)
            .update(&Identity::new("42"), &changes)
            .unwrap();

        assert_eq!(
            mock.last_body(Method::Put),
            Some(json!({"recipients": "ops@acme.io", "branches_to_be_notified": "all"}))
        );
    }

    #[test]
    fn test_branch_filter_validation() {
        let registry = AccessLevelRegistry::gitlab();
        let adapter = adapter(&MockBackend::new());
        let upper = PipelinesEmailService {
            branches_to_be_notified: Some("Default_And_Protected".into()),
            ..emails()
        };
        assert!(adapter.validate(&upper, &registry).is_ok());

        let bad = PipelinesEmailService {
            branches_to_be_notified: Some("feature".into()),
            ..emails()
        };
        assert!(adapter.validate(&bad, &registry).is_err());

        let empty = PipelinesEmailService {
            recipients: Some(BTreeSet::new()),
            ..emails()
        };
        assert!(adapter.validate(&empty, &registry).is_err());
    }
}
