//! Custom attributes on users
//!
//! GitLab upserts attributes with `PUT`, so create and update hit the same
//! endpoint. Identity is `user:key`.

use crate::client::Client;
use crate::resources::{api_path, invalid, needed, required};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, decode_pair, encode_pair,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const KIND: &str = "user_custom_attribute";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserCustomAttribute {
    pub user: Option<i64>,
    pub key: Option<String>,
    pub value: Option<String>,
}

static FIELDS: [Field<UserCustomAttribute>; 3] = [
    Field::force_new("user", |s: &UserCustomAttribute| s.user.map(FieldValue::from)),
    Field::force_new("key", |s: &UserCustomAttribute| s.key.clone().map(FieldValue::from)),
    Field::mutable("value", |s: &UserCustomAttribute| s.value.clone().map(FieldValue::from)),
];

/// Adapter for `user_custom_attribute`
pub struct UserCustomAttributeAdapter {
    client: Client,
}

impl UserCustomAttributeAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn split(identity: &Identity) -> Result<(i64, String), AdapterError> {
        let user = identity.numeric_part::<i64>(2, 0).map_err(invalid)?;
        let (_, key) = decode_pair(identity).map_err(invalid)?;
        Ok((user, key))
    }

    fn attribute_path(user: i64, key: &str) -> String {
        api_path(&["users", &user.to_string(), "custom_attributes", key])
    }

    fn write(&self, user: i64, key: &str, value: &str) -> Result<ApiAttribute, AdapterError> {
        self.client
            .put(&Self::attribute_path(user, key), &json!({ "value": value }))
    }
}

impl RemoteAdapter for UserCustomAttributeAdapter {
    type State = UserCustomAttribute;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<UserCustomAttribute>] {
        &FIELDS
    }

    fn describe(&self, state: &UserCustomAttribute) -> String {
        format!(
            "attribute {} of user {}",
            state.key.as_deref().unwrap_or("?"),
            state.user.map_or_else(|| "?".to_string(), |u| u.to_string())
        )
    }

    fn identity_arity(&self) -> usize {
        2
    }

    fn check_identity(&self, identity: &Identity) -> reconcile::Result<()> {
        identity.numeric_part::<i64>(2, 0).map(|_| ())
    }

    fn validate(
        &self,
        desired: &UserCustomAttribute,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        if *required(&desired.user, "user")? <= 0 {
            return Err(Error::validation("user", "must be a positive user id"));
        }
        let key = required(&desired.key, "key")?;
        reconcile::identity::check_component(key)?;
        required(&desired.value, "value")?;
        Ok(())
    }

    fn create(
        &self,
        desired: &UserCustomAttribute,
    ) -> Result<Created<UserCustomAttribute>, AdapterError> {
        let user = *needed(&desired.user, "user")?;
        let key = needed(&desired.key, "key")?;
        let attribute = self.write(user, key, needed(&desired.value, "value")?)?;
        Ok(Created {
            identity: encode_pair(&user.to_string(), key).map_err(invalid)?,
            echo: Some(attribute.into_state(user)),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<UserCustomAttribute>, AdapterError> {
        let (user, key) = Self::split(identity)?;
        let attribute: ApiAttribute = self.client.get(&Self::attribute_path(user, &key))?;
        Ok(Observed::new(attribute.into_state(user)))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<UserCustomAttribute>, AdapterError> {
        let (user, key) = Self::split(identity)?;
        let value = changes
            .get("value")
            .and_then(FieldValue::as_str)
            .ok_or_else(|| AdapterError::request("only value can change in place"))?;
        let attribute = self.write(user, &key, value)?;
        Ok(Observed::new(attribute.into_state(user)))
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        let (user, key) = Self::split(identity)?;
        self.client.delete(&Self::attribute_path(user, &key))
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiAttribute {
    key: String,
    value: String,
}

impl ApiAttribute {
    fn into_state(self, user: i64) -> UserCustomAttribute {
        UserCustomAttribute {
            user: Some(user),
            key: Some(self.key),
            value: Some(self.value),
        }
    }
}
