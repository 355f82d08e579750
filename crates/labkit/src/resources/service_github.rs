//! GitHub integration: reports pipeline statuses to a GitHub repository

use crate::client::Client;
use crate::resources::integration::{self, ApiIntegration};
use crate::resources::{flag, invalid, is_http_url, needed, required, text};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, UpdateStyle, encode,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;

pub const KIND: &str = "service_github";
const SLUG: &str = "github";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubService {
    pub project: Option<String>,
    /// GitHub token with `repo:status` scope
    pub token: Option<String>,
    pub repository_url: Option<String>,
    /// Append the instance name to the status context
    pub static_context: Option<bool>,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

static FIELDS: [Field<GithubService>; 7] = [
    Field::force_new("project", |s: &GithubService| s.project.clone().map(FieldValue::from)),
    Field::write_only(
        "token",
        |s: &GithubService| s.token.clone().map(FieldValue::from),
        |t: &mut GithubService, s: &GithubService| t.token.clone_from(&s.token),
    ),
    Field::mutable("repository_url", |s: &GithubService| {
        s.repository_url.clone().map(FieldValue::from)
    }),
    Field::mutable("static_context", |s: &GithubService| s.static_context.map(FieldValue::from)),
    Field::computed("title", |s: &GithubService| s.title.clone().map(FieldValue::from)),
    Field::computed("created_at", |s: &GithubService| s.created_at.clone().map(FieldValue::from)),
    Field::computed("updated_at", |s: &GithubService| s.updated_at.clone().map(FieldValue::from)),
];

/// Adapter for `service_github`
pub struct GithubServiceAdapter {
    client: Client,
}

impl GithubServiceAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn observe(project: String, integration: &ApiIntegration) -> GithubService {
        GithubService {
            project: Some(project),
            token: None,
            repository_url: text(integration.property("repository_url")),
            static_context: flag(integration.property("static_context")),
            title: integration.title.clone(),
            created_at: integration.created_at.clone(),
            updated_at: integration.updated_at.clone(),
        }
    }
}

impl RemoteAdapter for GithubServiceAdapter {
    type State = GithubService;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<GithubService>] {
        &FIELDS
    }

    fn describe(&self, state: &GithubService) -> String {
        format!(
            "GitHub integration of project {} -> {}",
            state.project.as_deref().unwrap_or("?"),
            state.repository_url.as_deref().unwrap_or("?")
        )
    }

    fn validate(
        &self,
        desired: &GithubService,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.project, "project")?)?;
        required(&desired.token, "token")?;
        if !is_http_url(required(&desired.repository_url, "repository_url")?) {
            return Err(Error::validation("repository_url", "must be an http or https URL"));
        }
        Ok(())
    }

    fn create(&self, desired: &GithubService) -> Result<Created<GithubService>, AdapterError> {
        let project = needed(&desired.project, "project")?;
        let mut body = Map::new();
        body.insert("token".into(), needed(&desired.token, "token")?.clone().into());
        body.insert(
            "repository_url".into(),
            needed(&desired.repository_url, "repository_url")?.clone().into(),
        );
        body.insert("static_context".into(), desired.static_context.unwrap_or(true).into());

        integration::put(&self.client, project, SLUG, body)?;
        Ok(Created::new(encode(&[project]).map_err(invalid)?))
    }

    fn read(&self, identity: &Identity) -> Result<Observed<GithubService>, AdapterError> {
        let project = identity.as_str().to_string();
        let integration = integration::fetch(&self.client, &project, SLUG)?;
        Ok(Observed::new(Self::observe(project, &integration)))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<GithubService>, AdapterError> {
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
