//! Existing Kubernetes clusters attached to a project
//!
//! Kubernetes connection settings are flattened into `kubernetes_*` fields
//! and sent nested under `platform_kubernetes_attributes`. The token is
//! never returned by GitLab.

use crate::client::Client;
use crate::resources::{api_path, invalid, is_http_url, needed, put_opt, required};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, decode_pair, encode_pair,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KIND: &str = "project_cluster";

pub const AUTHORIZATION_TYPES: [&str; 3] = ["rbac", "abac", "unknown_authorization"];

/// A user-provided cluster integration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectCluster {
    pub project: Option<String>,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub enabled: Option<bool>,
    pub managed: Option<bool>,
    /// Environments the cluster serves, `*` for all
    pub environment_scope: Option<String>,
    pub management_project_id: Option<i64>,
    pub kubernetes_api_url: Option<String>,
    pub kubernetes_token: Option<String>,
    pub kubernetes_ca_cert: Option<String>,
    pub kubernetes_namespace: Option<String>,
    /// `rbac` (default), `abac` or `unknown_authorization`
    pub kubernetes_authorization_type: Option<String>,
    pub created_at: Option<String>,
    pub provider_type: Option<String>,
    pub platform_type: Option<String>,
    pub cluster_type: Option<String>,
}

static FIELDS: [Field<ProjectCluster>; 16] = [
    Field::force_new("project", |s: &ProjectCluster| s.project.clone().map(FieldValue::from)),
    Field::mutable("name", |s: &ProjectCluster| s.name.clone().map(FieldValue::from)),
    Field::mutable("domain", |s: &ProjectCluster| s.domain.clone().map(FieldValue::from)),
    Field::force_new("enabled", |s: &ProjectCluster| s.enabled.map(FieldValue::from)),
    Field::force_new("managed", |s: &ProjectCluster| s.managed.map(FieldValue::from)),
    Field::mutable("environment_scope", |s: &ProjectCluster| {
        s.environment_scope.clone().map(FieldValue::from)
    }),
    Field::mutable("management_project_id", |s: &ProjectCluster| {
        s.management_project_id.map(FieldValue::from)
    }),
    Field::mutable("kubernetes_api_url", |s: &ProjectCluster| {
        s.kubernetes_api_url.clone().map(FieldValue::from)
    }),
    Field::write_only(
        "kubernetes_token",
        |s: &ProjectCluster| s.kubernetes_token.clone().map(FieldValue::from),
        |t: &mut ProjectCluster, s: &ProjectCluster| {
            t.kubernetes_token.clone_from(&s.kubernetes_token)
        },
    ),
    Field::mutable("kubernetes_ca_cert", |s: &ProjectCluster| {
        s.kubernetes_ca_cert.as_deref().map(|c| FieldValue::from(c.trim()))
    }),
    Field::mutable("kubernetes_namespace", |s: &ProjectCluster| {
        s.kubernetes_namespace.clone().map(FieldValue::from)
    }),
    Field::force_new("kubernetes_authorization_type", |s: &ProjectCluster| {
        s.kubernetes_authorization_type.clone().map(FieldValue::from)
    }),
    Field::computed("created_at", |s: &ProjectCluster| s.created_at.clone().map(FieldValue::from)),
    Field::computed("provider_type", |s: &ProjectCluster| {
        s.provider_type.clone().map(FieldValue::from)
    }),
    Field::computed("platform_type", |s: &ProjectCluster| {
        s.platform_type.clone().map(FieldValue::from)
    }),
    Field::computed("cluster_type", |s: &ProjectCluster| {
        s.cluster_type.clone().map(FieldValue::from)
    }),
];

/// Maps flattened field names to their `platform_kubernetes_attributes` key.
const KUBERNETES_ATTRIBUTES: [(&str, &str); 5] = [
    ("kubernetes_api_url", "api_url"),
    ("kubernetes_token", "token"),
    ("kubernetes_ca_cert", "ca_cert"),
    ("kubernetes_namespace", "namespace"),
    ("kubernetes_authorization_type", "authorization_type"),
];

/// Adapter for `project_cluster`
pub struct ProjectClusterAdapter {
    client: Client,
}

impl ProjectClusterAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn cluster_path(project: &str, cluster_id: &str) -> String {
        api_path(&["projects", project, "clusters", cluster_id])
    }
}

/// Split a flat change set into top-level and nested Kubernetes attributes.
fn cluster_body(changes: &FieldDiff) -> Map<String, Value> {
    let mut body = Map::new();
    let mut kubernetes = Map::new();
    for (name, value) in changes.iter() {
        match KUBERNETES_ATTRIBUTES.iter().find(|(field, _)| *field == name) {
            Some((_, attribute)) => {
                kubernetes.insert((*attribute).to_string(), value.to_json());
            }
            None if name != "project" => {
                body.insert(name.to_string(), value.to_json());
            }
            None => {}
        }
    }
    if !kubernetes.is_empty() {
        body.insert("platform_kubernetes_attributes".into(), Value::Object(kubernetes));
    }
    body
}

impl RemoteAdapter for ProjectClusterAdapter {
    type State = ProjectCluster;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<ProjectCluster>] {
        &FIELDS
    }

    fn describe(&self, state: &ProjectCluster) -> String {
        format!(
            "cluster {} on project {}",
            state.name.as_deref().unwrap_or("?"),
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
        desired: &ProjectCluster,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.project, "project")?)?;
        if required(&desired.name, "name")?.trim().is_empty() {
            return Err(Error::validation("name", "must not be blank"));
        }
        if !is_http_url(required(&desired.kubernetes_api_url, "kubernetes_api_url")?) {
            return Err(Error::validation("kubernetes_api_url", "must be an http or https URL"));
        }
        required(&desired.kubernetes_token, "kubernetes_token")?;
        if let Some(auth) = &desired.kubernetes_authorization_type
            && !AUTHORIZATION_TYPES.contains(&auth.as_str())
        {
            return Err(Error::validation(
                "kubernetes_authorization_type",
                format!("{auth:?} is not one of {}", AUTHORIZATION_TYPES.join(", ")),
            ));
        }
        Ok(())
    }

    fn create(&self, desired: &ProjectCluster) -> Result<Created<ProjectCluster>, AdapterError> {
        let project = needed(&desired.project, "project")?;

        let mut kubernetes = Map::new();
        kubernetes.insert(
            "api_url".into(),
            needed(&desired.kubernetes_api_url, "kubernetes_api_url")?.clone().into(),
        );
        kubernetes.insert(
            "token".into(),
            needed(&desired.kubernetes_token, "kubernetes_token")?.clone().into(),
        );
        put_opt(&mut kubernetes, "ca_cert", desired.kubernetes_ca_cert.clone());
        put_opt(&mut kubernetes, "namespace", desired.kubernetes_namespace.clone());
        kubernetes.insert(
            "authorization_type".into(),
            desired
                .kubernetes_authorization_type
                .clone()
                .unwrap_or_else(|| "rbac".to_string())
                .into(),
        );

        let mut body = Map::new();
        body.insert("name".into(), needed(&desired.name, "name")?.clone().into());
        put_opt(&mut body, "domain", desired.domain.clone());
        body.insert("enabled".into(), desired.enabled.unwrap_or(true).into());
        body.insert("managed".into(), desired.managed.unwrap_or(true).into());
        body.insert(
            "environment_scope".into(),
            desired
                .environment_scope
                .clone()
                .unwrap_or_else(|| "*".to_string())
                .into(),
        );
        put_opt(&mut body, "management_project_id", desired.management_project_id);
        body.insert("platform_kubernetes_attributes".into(), Value::Object(kubernetes));

        let cluster: ApiCluster = self.client.post(
            &api_path(&["projects", project, "clusters", "user"]),
            &Value::Object(body),
        )?;
        Ok(Created {
            identity: encode_pair(project, &cluster.id.to_string()).map_err(invalid)?,
            echo: Some(cluster.into_state(project.clone())),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<ProjectCluster>, AdapterError> {
        let (project, cluster_id) = decode_pair(identity).map_err(invalid)?;
        let cluster: ApiCluster = self.client.get(&Self::cluster_path(&project, &cluster_id))?;
        Ok(Observed::new(cluster.into_state(project)))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<ProjectCluster>, AdapterError> {
        let (project, cluster_id) = decode_pair(identity).map_err(invalid)?;
        let cluster: ApiCluster = self.client.put(
            &Self::cluster_path(&project, &cluster_id),
            &Value::Object(cluster_body(changes)),
        )?;
        Ok(Observed::new(cluster.into_state(project)))
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        let (project, cluster_id) = decode_pair(identity).map_err(invalid)?;
        self.client.delete(&Self::cluster_path(&project, &cluster_id))
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiCluster {
    id: i64,
    name: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    managed: Option<bool>,
    #[serde(default)]
    environment_scope: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    provider_type: Option<String>,
    #[serde(default)]
    platform_type: Option<String>,
    #[serde(default)]
    cluster_type: Option<String>,
    #[serde(default)]
    platform_kubernetes: Option<ApiKubernetes>,
    #[serde(default)]
    management_project: Option<ApiProjectRef>,
}

#[derive(Debug, Deserialize)]
struct ApiKubernetes {
    api_url: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    authorization_type: Option<String>,
    #[serde(default)]
    ca_cert: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiProjectRef {
    id: i64,
}

impl ApiCluster {
    fn into_state(self, project: String) -> ProjectCluster {
        let kubernetes = self.platform_kubernetes;
        let (api_url, namespace, authorization_type, ca_cert) = match kubernetes {
            Some(k) => (k.api_url, k.namespace, k.authorization_type, k.ca_cert),
            None => (None, None, None, None),
        };
        ProjectCluster {
            project: Some(project),
            name: Some(self.name),
            domain: self.domain,
            enabled: self.enabled,
            managed: self.managed,
            environment_scope: self.environment_scope,
            management_project_id: self.management_project.map(|p| p.id),
            kubernetes_api_url: api_url,
            kubernetes_token: None,
            kubernetes_ca_cert: ca_cert,
            kubernetes_namespace: namespace,
            kubernetes_authorization_type: authorization_type,
            created_at: self.created_at,
            provider_type: self.provider_type,
            platform_type: self.platform_type,
            cluster_type: self.cluster_type,
        }
    }
}
