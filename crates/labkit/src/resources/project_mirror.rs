//! Push mirrors of a project
//!
//! GitLab has no call to remove a push mirror. Deleting one disables it
//! instead, and a disabled mirror counts as gone. The mirror URL may embed
//! credentials, so it is treated as write-only: GitLab only ever returns it
//! masked.

use crate::client::Client;
use crate::resources::{api_path, body_from, invalid, is_http_url, needed, required};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, DeleteMode, Error, Field, FieldDiff, FieldValue,
    Identity, Observed, RemoteAdapter, decode_pair, encode_pair,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const KIND: &str = "project_mirror";

/// Page size used when listing mirrors.
const PAGE_SIZE: usize = 100;

/// A push mirror
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectMirror {
    pub project: Option<String>,
    /// Target URL, possibly with credentials
    pub url: Option<String>,
    pub enabled: Option<bool>,
    pub only_protected_branches: Option<bool>,
    pub keep_divergent_refs: Option<bool>,
    pub update_status: Option<String>,
}

static FIELDS: [Field<ProjectMirror>; 6] = [
    Field::force_new("project", |s: &ProjectMirror| s.project.clone().map(FieldValue::from)),
    Field::write_only(
        "url",
        |s: &ProjectMirror| s.url.clone().map(FieldValue::from),
        |t: &mut ProjectMirror, s: &ProjectMirror| t.url.clone_from(&s.url),
    )
    .replacing(),
    Field::mutable("enabled", |s: &ProjectMirror| s.enabled.map(FieldValue::from)),
    Field::mutable("only_protected_branches", |s: &ProjectMirror| {
        s.only_protected_branches.map(FieldValue::from)
    }),
    Field::mutable("keep_divergent_refs", |s: &ProjectMirror| {
        s.keep_divergent_refs.map(FieldValue::from)
    }),
    Field::computed("update_status", |s: &ProjectMirror| {
        s.update_status.clone().map(FieldValue::from)
    }),
];

/// Adapter for `project_mirror`
pub struct ProjectMirrorAdapter {
    client: Client,
}

impl ProjectMirrorAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn mirrors_path(project: &str) -> String {
        api_path(&["projects", project, "remote_mirrors"])
    }

    fn split(identity: &Identity) -> Result<(String, i64), AdapterError> {
        let (project, _) = decode_pair(identity).map_err(invalid)?;
        let mirror_id = identity.numeric_part::<i64>(2, 1).map_err(invalid)?;
        Ok((project, mirror_id))
    }

    /// Find one mirror in the project's list.
    fn find(&self, project: &str, mirror_id: i64) -> Result<ApiMirror, AdapterError> {
        let base = Self::mirrors_path(project);
        for page in 1.. {
            let mirrors: Vec<ApiMirror> = self
                .client
                .get(&format!("{base}?per_page={PAGE_SIZE}&page={page}"))?;
            let last = mirrors.len() < PAGE_SIZE;
            if let Some(mirror) = mirrors.into_iter().find(|m| m.id == mirror_id) {
                return Ok(mirror);
            }
            if last {
                break;
            }
        }
        Err(AdapterError::NotFound)
    }
}

impl RemoteAdapter for ProjectMirrorAdapter {
    type State = ProjectMirror;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<ProjectMirror>] {
        &FIELDS
    }

    fn describe(&self, state: &ProjectMirror) -> String {
        format!("push mirror of project {}", state.project.as_deref().unwrap_or("?"))
    }

    fn identity_arity(&self) -> usize {
        2
    }

    fn check_identity(&self, identity: &Identity) -> reconcile::Result<()> {
        identity.numeric_part::<i64>(2, 1).map(|_| ())
    }

    fn validate(
        &self,
        desired: &ProjectMirror,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.project, "project")?)?;
        let url = required(&desired.url, "url")?;
        if !(is_http_url(url) || url.starts_with("ssh://")) {
            return Err(Error::validation("url", "must be an http, https or ssh URL"));
        }
        Ok(())
    }

    fn create(&self, desired: &ProjectMirror) -> Result<Created<ProjectMirror>, AdapterError> {
        let project = needed(&desired.project, "project")?;
        let body = json!({
            "url": needed(&desired.url, "url")?,
            "enabled": desired.enabled.unwrap_or(true),
            "only_protected_branches": desired.only_protected_branches.unwrap_or(true),
            "keep_divergent_refs": desired.keep_divergent_refs.unwrap_or(true),
        });
        let mirror: ApiMirror = self.client.post(&Self::mirrors_path(project), &body)?;
        Ok(Created {
            identity: encode_pair(project, &mirror.id.to_string()).map_err(invalid)?,
            echo: Some(mirror.into_state(project.clone())),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<ProjectMirror>, AdapterError> {
        let (project, mirror_id) = Self::split(identity)?;
        let mirror = self.find(&project, mirror_id)?;
        let observed = Observed::new(mirror.into_state(project));
        Ok(match observed.state.update_status.as_deref() {
            Some("failed") => observed.warn("last mirror update failed"),
            _ => observed,
        })
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<ProjectMirror>, AdapterError> {
        let (project, mirror_id) = Self::split(identity)?;
        let body = Value::Object(body_from(changes, &["project", "url"]));
        let path = api_path(&["projects", &project, "remote_mirrors", &mirror_id.to_string()]);
        let mirror: ApiMirror = self.client.put(&path, &body)?;
        Ok(Observed::new(mirror.into_state(project)))
    }

    fn delete(&self, _identity: &Identity) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported { operation: "delete" })
    }

    /// A disabled mirror counts as deleted.
    fn exists(&self, identity: &Identity) -> Result<bool, AdapterError> {
        match self.read(identity) {
            Ok(observed) => Ok(observed.state.enabled.unwrap_or(true)),
            Err(AdapterError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete_mode(&self) -> DeleteMode {
        DeleteMode::Disable {
            field: "enabled",
            value: FieldValue::Bool(false),
        }
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiMirror {
    id: i64,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    only_protected_branches: bool,
    #[serde(default)]
    keep_divergent_refs: bool,
    #[serde(default)]
    update_status: Option<String>,
}

impl ApiMirror {
    /// The URL is left unset; GitLab returns it with credentials masked.
    fn into_state(self, project: String) -> ProjectMirror {
        ProjectMirror {
            project: Some(project),
            url: None,
            enabled: Some(self.enabled),
            only_protected_branches: Some(self.only_protected_branches),
            keep_divergent_refs: Some(self.keep_divergent_refs),
            update_status: self.update_status,
        }
    }
}
