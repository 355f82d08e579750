//! Jira integration

use crate::client::Client;
use crate::resources::integration::{self, ApiIntegration};
use crate::resources::{invalid, is_http_url, needed, put_opt, required, text};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, UpdateStyle, encode,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;

pub const KIND: &str = "service_jira";
const SLUG: &str = "jira";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JiraService {
    pub project: Option<String>,
    /// Base URL of the Jira instance
    pub url: Option<String>,
    pub project_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Transition applied when a commit closes an issue
    pub jira_issue_transition_id: Option<String>,
    pub commit_events: Option<bool>,
    pub merge_requests_events: Option<bool>,
    pub comment_on_event_enabled: Option<bool>,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

static FIELDS: [Field<JiraService>; 12] = [
    Field::force_new("project", |s: &JiraService| s.project.clone().map(FieldValue::from)),
    Field::mutable("url", |s: &JiraService| s.url.clone().map(FieldValue::from)),
    Field::mutable("project_key", |s: &JiraService| s.project_key.clone().map(FieldValue::from)),
    Field::mutable("username", |s: &JiraService| s.username.clone().map(FieldValue::from)),
    Field::write_only(
        "password",
        |s: &JiraService| s.password.clone().map(FieldValue::from),
        |t: &mut JiraService, s: &JiraService| t.password.clone_from(&s.password),
    ),
    Field::mutable("jira_issue_transition_id", |s: &JiraService| {
        s.jira_issue_transition_id.clone().map(FieldValue::from)
    }),
    Field::mutable("commit_events", |s: &JiraService| s.commit_events.map(FieldValue::from)),
    Field::mutable("merge_requests_events", |s: &JiraService| {
        s.merge_requests_events.map(FieldValue::from)
    }),
    Field::mutable("comment_on_event_enabled", |s: &JiraService| {
        s.comment_on_event_enabled.map(FieldValue::from)
    }),
    Field::computed("title", |s: &JiraService| s.title.clone().map(FieldValue::from)),
    Field::computed("created_at", |s: &JiraService| s.created_at.clone().map(FieldValue::from)),
    Field::computed("updated_at", |s: &JiraService| s.updated_at.clone().map(FieldValue::from)),
];

/// Adapter for `service_jira`
pub struct JiraServiceAdapter {
    client: Client,
}

impl JiraServiceAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn observe(project: String, integration: &ApiIntegration) -> JiraService {
        JiraService {
            project: Some(project),
            url: text(integration.property("url")),
            project_key: Some(text(integration.property("project_key")).unwrap_or_default()),
            username: text(integration.property("username")),
            password: None,
            jira_issue_transition_id: text(integration.property("jira_issue_transition_id")),
            commit_events: integration.commit_events,
            merge_requests_events: integration.merge_requests_events,
            comment_on_event_enabled: integration.comment_on_event_enabled,
            title: integration.title.clone(),
            created_at: integration.created_at.clone(),
            updated_at: integration.updated_at.clone(),
        }
    }
}

impl RemoteAdapter for JiraServiceAdapter {
    type State = JiraService;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<JiraService>] {
        &FIELDS
    }

    fn describe(&self, state: &JiraService) -> String {
        format!(
            "Jira integration of project {} -> {}",
            state.project.as_deref().unwrap_or("?"),
            state.url.as_deref().unwrap_or("?")
        )
    }

    fn validate(
        &self,
        desired: &JiraService,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.project, "project")?)?;
        let url = required(&desired.url, "url")?;
        if !is_http_url(url) {
            return Err(Error::validation("url", format!("{url:?} is not an http or https URL")));
        }
        required(&desired.username, "username")?;
        required(&desired.password, "password")?;
        Ok(())
    }

    fn create(&self, desired: &JiraService) -> Result<Created<JiraService>, AdapterError> {
        let project = needed(&desired.project, "project")?;
        let mut body = Map::new();
        body.insert("url".into(), needed(&desired.url, "url")?.clone().into());
        body.insert("username".into(), needed(&desired.username, "username")?.clone().into());
        body.insert("password".into(), needed(&desired.password, "password")?.clone().into());
        body.insert(
            "project_key".into(),
            desired.project_key.clone().unwrap_or_default().into(),
        );
        put_opt(&mut body, "jira_issue_transition_id", desired.jira_issue_transition_id.clone());
        put_opt(&mut body, "commit_events", desired.commit_events);
        put_opt(&mut body, "merge_requests_events", desired.merge_requests_events);
        put_opt(&mut body, "comment_on_event_enabled", desired.comment_on_event_enabled);

        integration::put(&self.client, project, SLUG, body)?;
        Ok(Created::new(encode(&[project]).map_err(invalid)?))
    }

    fn read(&self, identity: &Identity) -> Result<Observed<JiraService>, AdapterError> {
        let project = identity.as_str().to_string();
        let integration = integration::fetch(&self.client, &project, SLUG)?;
        Ok(Observed::new(Self::observe(project, &integration)))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<JiraService>, AdapterError> {
        let body = integration::settings(changes)
            .map(|(name, value)| (name.to_string(), value))
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
