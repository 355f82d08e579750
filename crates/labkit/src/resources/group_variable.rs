//! CI/CD variables defined on a group

use crate::client::Client;
use crate::resources::{api_path, body_from, invalid, needed, required};
use regex::Regex;
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, decode_pair, encode_pair,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::LazyLock;

pub const KIND: &str = "group_variable";

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("variable key regex is valid"));

const MAX_KEY_LEN: usize = 255;
/// Shortest value GitLab will mask.
const MIN_MASKED_LEN: usize = 8;
const VARIABLE_TYPES: [&str; 2] = ["env_var", "file"];

/// A group-level CI/CD variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupVariable {
    pub group: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    /// `env_var` (default) or `file`
    pub variable_type: Option<String>,
    pub protected: Option<bool>,
    pub masked: Option<bool>,
}

static FIELDS: [Field<GroupVariable>; 6] = [
    Field::force_new("group", |s: &GroupVariable| s.group.clone().map(FieldValue::from)),
    Field::force_new("key", |s: &GroupVariable| s.key.clone().map(FieldValue::from)),
    Field::secret("value", |s: &GroupVariable| s.value.clone().map(FieldValue::from)),
    Field::mutable("variable_type", |s: &GroupVariable| {
        s.variable_type.clone().map(FieldValue::from)
    }),
    Field::mutable("protected", |s: &GroupVariable| s.protected.map(FieldValue::from)),
    Field::mutable("masked", |s: &GroupVariable| s.masked.map(FieldValue::from)),
];

/// Adapter for `group_variable`
pub struct GroupVariableAdapter {
    client: Client,
}

impl GroupVariableAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn variables_path(group: &str) -> String {
        api_path(&["groups", group, "variables"])
    }

    fn variable_path(group: &str, key: &str) -> String {
        api_path(&["groups", group, "variables", key])
    }
}

impl RemoteAdapter for GroupVariableAdapter {
    type State = GroupVariable;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<GroupVariable>] {
        &FIELDS
    }

    fn describe(&self, state: &GroupVariable) -> String {
        format!(
            "variable {} in group {}",
            state.key.as_deref().unwrap_or("?"),
            state.group.as_deref().unwrap_or("?")
        )
    }

    fn identity_arity(&self) -> usize {
        2
    }

    fn validate(
        &self,
        desired: &GroupVariable,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.group, "group")?)?;
        let key = required(&desired.key, "key")?;
        if key.len() > MAX_KEY_LEN || !KEY_PATTERN.is_match(key) {
            return Err(Error::validation(
                "key",
                format!("{key:?} must be 1-{MAX_KEY_LEN} characters of A-Z, a-z, 0-9 and _"),
            ));
        }
        let value = required(&desired.value, "value")?;
        if let Some(kind) = &desired.variable_type
            && !VARIABLE_TYPES.contains(&kind.as_str())
        {
            return Err(Error::validation(
                "variable_type",
                format!("{kind:?} is not one of {}", VARIABLE_TYPES.join(", ")),
            ));
        }
        let maskable = value.len() >= MIN_MASKED_LEN && !value.contains(char::is_whitespace);
        if desired.masked == Some(true) && !maskable {
            return Err(Error::validation(
                "value",
                format!(
                    "a masked value needs at least {MIN_MASKED_LEN} characters and no whitespace"
                ),
            ));
        }
        Ok(())
    }

    fn create(&self, desired: &GroupVariable) -> Result<Created<GroupVariable>, AdapterError> {
        let group = needed(&desired.group, "group")?;
        let key = needed(&desired.key, "key")?;
        let value = needed(&desired.value, "value")?;

        let body = json!({
            "key": key,
            "value": value,
            "variable_type": desired.variable_type.as_deref().unwrap_or("env_var"),
            "protected": desired.protected.unwrap_or(false),
            "masked": desired.masked.unwrap_or(false),
        });
        let created: ApiVariable = self.client.post(&Self::variables_path(group), &body)?;
        Ok(Created {
            identity: encode_pair(group, key).map_err(invalid)?,
            echo: Some(created.into_state(group.clone())),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<GroupVariable>, AdapterError> {
        let (group, key) = decode_pair(identity).map_err(invalid)?;
        let variable: ApiVariable = self.client.get(&Self::variable_path(&group, &key))?;
        Ok(Observed::new(variable.into_state(group)))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<GroupVariable>, AdapterError> {
        let (group, key) = decode_pair(identity).map_err(invalid)?;
        let body = Value::Object(body_from(changes, &["group", "key"]));
        let variable: ApiVariable = self.client.put(&Self::variable_path(&group, &key), &body)?;
        Ok(Observed::new(variable.into_state(group)))
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        let (group, key) = decode_pair(identity).map_err(invalid)?;
        self.client.delete(&Self::variable_path(&group, &key))
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiVariable {
    key: String,
    value: String,
    #[serde(default)]
    variable_type: Option<String>,
    #[serde(default)]
    protected: bool,
    #[serde(default)]
    masked: bool,
}

impl ApiVariable {
    fn into_state(self, group: String) -> GroupVariable {
        GroupVariable {
            group: Some(group),
            key: Some(self.key),
            value: Some(self.value),
            variable_type: Some(self.variable_type.unwrap_or_else(|| "env_var".to_string())),
            protected: Some(self.protected),
            masked: Some(self.masked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Method, MockBackend};
    use reconcile::{Instance, Orchestrator, UpdateOutcome};
    use std::sync::Arc;

    fn adapter(mock: &MockBackend) -> GroupVariableAdapter {
        GroupVariableAdapter::new(Client::with_backend(Arc::new(mock.clone())))
    }

    fn api_key() -> GroupVariable {
        GroupVariable {
            group: Some("platform".into()),
            key: Some("API_KEY".into()),
            value: Some("s3cr3t-value".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_applies_defaults() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Post,
            "groups/platform/variables",
            json!({"key": "API_KEY", "value": "s3cr3t-value", "variable_type": "env_var",
                   "protected": false, "masked": false}),
        );
        let created = adapter(&mock).create(&api_key()).unwrap();

        assert_eq!(created.identity.as_str(), "platform:API_KEY");
        assert_eq!(
            mock.last_body(Method::Post),
            Some(json!({"key": "API_KEY", "value": "s3cr3t-value", "variable_type": "env_var",
                        "protected": false, "masked": false}))
        );
    }

    #[test]
    fn test_key_validation() {
        let registry = AccessLevelRegistry::gitlab();
        let adapter = adapter(&MockBackend::new());
        let long = "K".repeat(256);
        for bad in ["API-KEY", "", "with space", long.as_str()] {
            let desired = GroupVariable {
                key: Some(bad.to_string()),
                ..api_key()
            };
            assert!(adapter.validate(&desired, &registry).is_err(), "{bad:?} accepted");
        }
        assert!(adapter.validate(&api_key(), &registry).is_ok());
    }

    #[test]
    fn test_type_and_mask_validation() {
        let registry = AccessLevelRegistry::gitlab();
        let adapter = adapter(&MockBackend::new());
        let yaml = GroupVariable {
            variable_type: Some("yaml".into()),
            ..api_key()
        };
        assert!(adapter.validate(&yaml, &registry).is_err());

        let short = GroupVariable {
            value: Some("short".into()),
            masked: Some(true),
            ..api_key()
        };
        let err = adapter.validate(&short, &registry).unwrap_err();
        assert!(err.to_string().contains("masked"));
    }

    #[test]
    fn test_update_sends_only_changes() {
        let mock = MockBackend::new();
        let path = "groups/platform/variables/API_KEY";
        mock.respond(
            Method::Get,
            path,
            json!({"key": "API_KEY", "value": "old-value-1", "variable_type": "env_var",
                   "protected": false, "masked": false}),
        );
        mock.respond(
            Method::Put,
            path,
            json!({"key": "API_KEY", "value": "s3cr3t-value", "variable_type": "env_var",
                   "protected": true, "masked": false}),
        );
        let adapter = adapter(&mock);
        let registry = AccessLevelRegistry::gitlab();
        let orch = Orchestrator::new(&adapter, &registry);
        let mut instance = Instance::tracked(Identity::new("platform:API_KEY"));
        let desired = GroupVariable {
            protected: Some(true),
            ..api_key()
        };

        let outcome = orch.update(&mut instance, &desired).unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                fields: vec!["protected", "value"]
            }
        );
        assert_eq!(
            mock.last_body(Method::Put),
            Some(json!({"protected": true, "value": "s3cr3t-value"}))
        );
    }

    #[test]
    fn test_value_is_redacted_in_diffs() {
        let observed = GroupVariable {
            value: Some("old-value-1".into()),
            ..api_key()
        };
        let changes = reconcile::diff(&observed, &api_key(), &FIELDS);
        assert!(changes.is_sensitive("value"));
        assert!(!changes.to_string().contains("s3cr3t"));
    }

    #[test]
    fn test_read_missing_variable() {
        let err = adapter(&MockBackend::new())
            .read(&Identity::new("platform:GONE"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
