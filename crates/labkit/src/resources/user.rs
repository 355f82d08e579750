//! Instance users (requires an administrator token)
//!
//! GitLab removes users in the background, so a delete is followed by polling
//! until reads return 404. `reset_password` and `skip_confirmation` only
//! matter when the account is created and are never compared.

use crate::client::Client;
use crate::resources::{api_path, invalid, needed, put_opt, required};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, encode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KIND: &str = "user";

/// Shortest password GitLab accepts.
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct User {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
    pub can_create_group: Option<bool>,
    pub projects_limit: Option<i64>,
    pub is_external: Option<bool>,
    pub note: Option<String>,
    /// Send a password reset link instead of setting `password`
    pub reset_password: Option<bool>,
    pub skip_confirmation: Option<bool>,
    /// `active`, `blocked`, ...
    pub state: Option<String>,
    pub created_at: Option<String>,
}

static FIELDS: [Field<User>; 11] = [
    Field::mutable("username", |s: &User| s.username.clone().map(FieldValue::from)),
    Field::mutable("email", |s: &User| {
        s.email.as_deref().map(|e| FieldValue::from(e.to_lowercase()))
    }),
    Field::mutable("name", |s: &User| s.name.clone().map(FieldValue::from)),
    Field::write_only(
        "password",
        |s: &User| s.password.clone().map(FieldValue::from),
        |t: &mut User, s: &User| t.password.clone_from(&s.password),
    ),
    Field::mutable("is_admin", |s: &User| s.is_admin.map(FieldValue::from)),
    Field::mutable("can_create_group", |s: &User| s.can_create_group.map(FieldValue::from)),
    Field::mutable("projects_limit", |s: &User| s.projects_limit.map(FieldValue::from)),
    Field::mutable("is_external", |s: &User| s.is_external.map(FieldValue::from)),
    Field::mutable("note", |s: &User| s.note.clone().map(FieldValue::from)),
    Field::computed("state", |s: &User| s.state.clone().map(FieldValue::from)),
    Field::computed("created_at", |s: &User| s.created_at.clone().map(FieldValue::from)),
];

/// Field names that differ between the state and the write API.
fn api_name(field: &str) -> &str {
    match field {
        "is_admin" => "admin",
        "is_external" => "external",
        other => other,
    }
}

/// Adapter for `user`
pub struct UserAdapter {
    client: Client,
}

impl UserAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn user_path(identity: &Identity) -> Result<String, AdapterError> {
        let id = identity.numeric_part::<i64>(1, 0).map_err(invalid)?;
        Ok(api_path(&["users", &id.to_string()]))
    }
}

/// Update body; an email change skips the reconfirmation mail.
fn update_body(changes: &FieldDiff) -> Map<String, Value> {
    let mut body: Map<String, Value> = changes
        .iter()
        .map(|(name, value)| (api_name(name).to_string(), value.to_json()))
        .collect();
    if changes.contains("email") {
        body.insert("skip_reconfirmation".into(), Value::Bool(true));
    }
    body
}

impl RemoteAdapter for UserAdapter {
    type State = User;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<User>] {
        &FIELDS
    }

    fn describe(&self, state: &User) -> String {
        format!("user @{}", state.username.as_deref().unwrap_or("?"))
    }

    fn check_identity(&self, identity: &Identity) -> reconcile::Result<()> {
        identity.numeric_part::<i64>(1, 0).map(|_| ())
    }

    fn validate(&self, desired: &User, _registry: &AccessLevelRegistry) -> reconcile::Result<()> {
        if required(&desired.username, "username")?.trim().is_empty() {
            return Err(Error::validation("username", "must not be blank"));
        }
        let email = required(&desired.email, "email")?;
        if !email.contains('@') {
            return Err(Error::validation("email", format!("{email:?} is not an email address")));
        }
        required(&desired.name, "name")?;
        match (&desired.password, desired.reset_password) {
            (Some(password), _) if password.chars().count() < MIN_PASSWORD_LEN => {
                Err(Error::validation(
                    "password",
                    format!("must be at least {MIN_PASSWORD_LEN} characters"),
                ))
            }
            (None, None | Some(false)) => Err(Error::validation(
                "password",
                "is required unless reset_password is true",
            )),
            _ => Ok(()),
        }?;
        if desired.projects_limit.is_some_and(|limit| limit < 0) {
            return Err(Error::validation("projects_limit", "must not be negative"));
        }
        Ok(())
    }

    fn create(&self, desired: &User) -> Result<Created<User>, AdapterError> {
        let mut body = Map::new();
        body.insert("username".into(), needed(&desired.username, "username")?.clone().into());
        body.insert("email".into(), needed(&desired.email, "email")?.clone().into());
        body.insert("name".into(), needed(&desired.name, "name")?.clone().into());
        put_opt(&mut body, "password", desired.password.clone());
        put_opt(&mut body, "reset_password", desired.reset_password);
        body.insert(
            "skip_confirmation".into(),
            desired.skip_confirmation.unwrap_or(true).into(),
        );
        put_opt(&mut body, "admin", desired.is_admin);
        put_opt(&mut body, "can_create_group", desired.can_create_group);
        put_opt(&mut body, "projects_limit", desired.projects_limit);
        put_opt(&mut body, "external", desired.is_external);
        put_opt(&mut body, "note", desired.note.clone());

        let user: ApiUser = self.client.post("users", &Value::Object(body))?;
        Ok(Created {
            identity: encode(&[user.id.to_string()]).map_err(invalid)?,
            echo: Some(user.into()),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<User>, AdapterError> {
        let user: ApiUser = self.client.get(&Self::user_path(identity)?)?;
        let warning = match user.state.as_deref() {
            Some(state @ ("blocked" | "deactivated" | "banned")) => {
                Some(format!("account is {state}"))
            }
            _ => None,
        };
        let observed = Observed::new(User::from(user));
        Ok(match warning {
            Some(warning) => observed.warn(warning),
            None => observed,
        })
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<User>, AdapterError> {
        let user: ApiUser = self
            .client
            .put(&Self::user_path(identity)?, &Value::Object(update_body(changes)))?;
        Ok(Observed::new(user.into()))
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        self.client.delete(&Self::user_path(identity)?)
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: i64,
    username: String,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    is_admin: Option<bool>,
    #[serde(default)]
    can_create_group: Option<bool>,
    #[serde(default)]
    projects_limit: Option<i64>,
    #[serde(default)]
    external: Option<bool>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<ApiUser> for User {
    fn from(u: ApiUser) -> Self {
        Self {
            username: Some(u.username),
            email: u.email,
            name: Some(u.name),
            password: None,
            is_admin: u.is_admin,
            can_create_group: u.can_create_group,
            projects_limit: u.projects_limit,
            is_external: u.external,
            note: u.note,
            reset_password: None,
            skip_confirmation: None,
            state: u.state,
            created_at: u.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Method, MockBackend};
    use reconcile::{CancelToken, Instance, Orchestrator, Phase, PollConfig};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(mock: &MockBackend) -> UserAdapter {
        UserAdapter::new(Client::with_backend(Arc::new(mock.clone())))
    }

    fn alice() -> User {
        User {
            username: Some("alice".into()),
            email: Some("alice@acme.io".into()),
            name: Some("Alice".into()),
            password: Some("correct horse".into()),
            is_admin: Some(false),
            ..Default::default()
        }
    }

    fn api_alice(email: &str) -> Value {
        json!({
            "id": 7,
            "username": "alice",
            "name": "Alice",
            "email": email,
            "is_admin": false,
            "can_create_group": true,
            "projects_limit": 100,
            "external": false,
            "note": null,
            "state": "active",
            "created_at": "2024-01-15T10:00:00Z"
        })
    }

    #[test]
    fn test_create_maps_field_names() {
        let mock = MockBackend::new();
        mock.respond(Method::Post, "users", api_alice("alice@acme.io"));
        let created = adapter(&mock).create(&alice()).unwrap();

        assert_eq!(created.identity.as_str(), "7");
        assert_eq!(
            mock.last_body(Method::Post),
            Some(json!({"username": "alice", "email": "alice@acme.io", "name": "Alice",
                        "password": "correct horse", "skip_confirmation": true, "admin": false}))
        );
    }

    #[test]
    fn test_password_or_reset_required() {
        let registry = AccessLevelRegistry::gitlab();
        let adapter = adapter(&MockBackend::new());
        assert!(adapter.validate(&alice(), &registry).is_ok());

        let no_password = User {
            password: None,
            ..alice()
        };
        assert!(adapter.validate(&no_password, &registry).is_err());

        let reset = User {
            password: None,
            reset_password: Some(true),
            ..alice()
        };
        assert!(adapter.validate(&reset, &registry).is_ok());

        let short = User {
            password: Some("abc".into()),
            ..alice()
        };
        assert!(adapter.validate(&short, &registry).is_err());
    }

    #[test]
    fn test_email_change_skips_reconfirmation() {
        let mut changes = FieldDiff::new();
        changes.insert("email", FieldValue::from("alice@new.io"), false);
        changes.insert("is_external", FieldValue::from(true), false);
        assert_eq!(
            Value::Object(update_body(&changes)),
            json!({"email": "alice@new.io", "external": true, "skip_reconfirmation": true})
        );

        let note_only = FieldDiff::single("note", FieldValue::from("contractor"));
        assert!(!update_body(&note_only).contains_key("skip_reconfirmation"));
    }

    #[test]
    fn test_email_case_is_not_drift() {
        let observed = User::from(
            serde_json::from_value::<ApiUser>(api_alice("alice@acme.io")).unwrap(),
        );
        let desired = User {
            email: Some("Alice@ACME.io".into()),
            password: None,
            ..alice()
        };
        assert!(reconcile::diff(&observed, &desired, &FIELDS).is_empty());
    }

    #[test]
    fn test_blocked_account_warns() {
        let mock = MockBackend::new();
        let mut blocked = api_alice("alice@acme.io");
        blocked["state"] = json!("blocked");
        mock.respond(Method::Get, "users/7", blocked);
        let observed = adapter(&mock).read(&Identity::new("7")).unwrap();
        assert_eq!(observed.warnings, vec!["account is blocked".to_string()]);
    }

    #[test]
    fn test_delete_polls_until_gone() {
        let mock = MockBackend::new();
        mock.respond(Method::Get, "users/7", api_alice("alice@acme.io"));
        mock.respond(Method::Get, "users/7", api_alice("alice@acme.io"));
        let adapter = adapter(&mock);
        let registry = AccessLevelRegistry::gitlab();
        let orch = Orchestrator::new(&adapter, &registry)
            .with_poll_config(PollConfig::new(Duration::from_millis(1), Duration::from_secs(5)));
        let mut instance = Instance::present(Identity::new("7"), alice());

        orch.delete(&mut instance, &CancelToken::new()).unwrap();
        assert_eq!(instance.phase, Phase::Gone);
        assert_eq!(mock.requests_for(Method::Get).len(), 3);
        assert_eq!(mock.requests_for(Method::Delete).len(), 1);
    }

    #[test]
    fn test_identity_must_be_numeric() {
        let adapter = adapter(&MockBackend::new());
        assert!(adapter.check_identity(&Identity::new("alice")).is_err());
        assert!(adapter.check_identity(&Identity::new("7")).is_ok());
    }
}
