//! Project deploy keys
//!
//! Deploy keys cannot be edited: every managed field forces a new key. The
//! public key is compared with surrounding whitespace removed, since
//! manifests often carry the trailing newline of a `.pub` file.

use crate::client::Client;
use crate::resources::{api_path, invalid, needed, required};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, decode_pair, encode_pair,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const KIND: &str = "deploy_key";

/// An SSH key granting a project read (or push) access
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployKey {
    pub project: Option<String>,
    pub title: Option<String>,
    /// Public key, e.g. `ssh-ed25519 AAAA...`
    pub key: Option<String>,
    pub can_push: Option<bool>,
    pub created_at: Option<String>,
}

static FIELDS: [Field<DeployKey>; 5] = [
    Field::force_new("project", |s: &DeployKey| s.project.clone().map(FieldValue::from)),
    Field::force_new("title", |s: &DeployKey| s.title.clone().map(FieldValue::from)),
    Field::force_new("key", |s: &DeployKey| s.key.as_deref().map(|k| FieldValue::from(k.trim()))),
    Field::force_new("can_push", |s: &DeployKey| s.can_push.map(FieldValue::from)),
    Field::computed("created_at", |s: &DeployKey| s.created_at.clone().map(FieldValue::from)),
];

/// Adapter for `deploy_key`
pub struct DeployKeyAdapter {
    client: Client,
}

impl DeployKeyAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn key_path(identity: &Identity) -> Result<String, AdapterError> {
        let (project, key_id) = decode_pair(identity).map_err(invalid)?;
        Ok(api_path(&["projects", &project, "deploy_keys", &key_id]))
    }
}

impl RemoteAdapter for DeployKeyAdapter {
    type State = DeployKey;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<DeployKey>] {
        &FIELDS
    }

    fn describe(&self, state: &DeployKey) -> String {
        format!(
            "deploy key {:?} on project {}",
            state.title.as_deref().unwrap_or("?"),
            state.project.as_deref().unwrap_or("?")
        )
    }

    fn identity_arity(&self) -> usize {
        2
    }

    fn check_identity(&self, identity: &Identity) -> reconcile::Result<()> {
        identity.numeric_part::<i64>(2, 1).map(|_| ())
    }

    fn validate(
        &self,
        desired: &DeployKey,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.project, "project")?)?;
        if required(&desired.title, "title")?.trim().is_empty() {
            return Err(Error::validation("title", "must not be blank"));
        }
        if required(&desired.key, "key")?.trim().is_empty() {
            return Err(Error::validation("key", "must not be blank"));
        }
        Ok(())
    }

    fn create(&self, desired: &DeployKey) -> Result<Created<DeployKey>, AdapterError> {
        let project = needed(&desired.project, "project")?;
        let body = json!({
            "title": needed(&desired.title, "title")?,
            "key": needed(&desired.key, "key")?.trim(),
            "can_push": desired.can_push.unwrap_or(false),
        });
        let key: ApiDeployKey = self
            .client
            .post(&api_path(&["projects", project, "deploy_keys"]), &body)?;
        Ok(Created {
            identity: encode_pair(project, &key.id.to_string()).map_err(invalid)?,
            echo: Some(key.into_state(project.clone())),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<DeployKey>, AdapterError> {
        let (project, _) = decode_pair(identity).map_err(invalid)?;
        let key: ApiDeployKey = self.client.get(&Self::key_path(identity)?)?;
        Ok(Observed::new(key.into_state(project)))
    }

    fn update(
        &self,
        _identity: &Identity,
        _changes: &FieldDiff,
    ) -> Result<Observed<DeployKey>, AdapterError> {
        Err(AdapterError::Unsupported { operation: "update" })
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        self.client.delete(&Self::key_path(identity)?)
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiDeployKey {
    id: i64,
    title: String,
    key: String,
    #[serde(default)]
    can_push: bool,
    #[serde(default)]
    created_at: Option<String>,
}

impl ApiDeployKey {
    fn into_state(self, project: String) -> DeployKey {
        DeployKey {
            project: Some(project),
            title: Some(self.title),
            key: Some(self.key),
            can_push: Some(self.can_push),
            created_at: self.created_at,
        }
    }
}
