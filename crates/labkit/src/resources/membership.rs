//! Project and group memberships
//!
//! A membership grants one user an access level on a project or group. The
//! identity is `parent:user_id`. Access levels are declared by name and sent
//! as numeric codes; a code the registry does not know is observed as "no
//! level" with a warning so the next apply re-sends the declared one.

use crate::client::Client;
use crate::resources::{api_path, invalid, needed, put_opt};
use chrono::NaiveDate;
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, decode_pair, encode_pair,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub const PROJECT_KIND: &str = "project_membership";
pub const GROUP_KIND: &str = "group_membership";

/// Levels a project membership cannot grant.
const PROJECT_EXCLUDED: [&str; 1] = ["owner"];

/// A user's membership of a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectMembership {
    /// Project id or full path
    pub project: Option<String>,
    pub user_id: Option<i64>,
    /// Access level name, e.g. "developer"
    pub access_level: Option<String>,
}

/// A user's membership of a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupMembership {
    /// Group id or full path
    pub group: Option<String>,
    pub user_id: Option<i64>,
    pub access_level: Option<String>,
    /// Expiry date, `YYYY-MM-DD`
    pub expires_at: Option<String>,
}

fn level_name(level: Option<&String>) -> Option<FieldValue> {
    level.map(|l| FieldValue::from(l.trim().to_ascii_lowercase()))
}

static PROJECT_FIELDS: [Field<ProjectMembership>; 3] = [
    Field::force_new("project", |s: &ProjectMembership| s.project.clone().map(FieldValue::from)),
    Field::force_new("user_id", |s: &ProjectMembership| s.user_id.map(FieldValue::from)),
    Field::mutable("access_level", |s: &ProjectMembership| level_name(s.access_level.as_ref())),
];

static GROUP_FIELDS: [Field<GroupMembership>; 4] = [
    Field::force_new("group", |s: &GroupMembership| s.group.clone().map(FieldValue::from)),
    Field::force_new("user_id", |s: &GroupMembership| s.user_id.map(FieldValue::from)),
    Field::mutable("access_level", |s: &GroupMembership| level_name(s.access_level.as_ref())),
    Field::mutable("expires_at", |s: &GroupMembership| s.expires_at.clone().map(FieldValue::from)),
];

/// Where a membership lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Project,
    Group,
}

impl Scope {
    fn collection(self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Group => "groups",
        }
    }

    fn excluded(self) -> &'static [&'static str] {
        match self {
            Self::Project => &PROJECT_EXCLUDED,
            Self::Group => &[],
        }
    }
}

/// HTTP plumbing shared by both membership kinds
struct Members {
    client: Client,
    registry: Arc<AccessLevelRegistry>,
    scope: Scope,
}

impl Members {
    fn collection_path(&self, parent: &str) -> String {
        api_path(&[self.scope.collection(), parent, "members"])
    }

    fn member_path(&self, parent: &str, user_id: i64) -> String {
        api_path(&[self.scope.collection(), parent, "members", &user_id.to_string()])
    }

    fn split(identity: &Identity) -> Result<(String, i64), AdapterError> {
        let (parent, _) = decode_pair(identity).map_err(invalid)?;
        let user_id = identity.numeric_part::<i64>(2, 1).map_err(invalid)?;
        Ok((parent, user_id))
    }

    fn code(&self, level: &str) -> Result<i64, AdapterError> {
        self.registry
            .validate_name(level, self.scope.excluded())
            .map_err(invalid)
    }

    /// Translate an API member; an unknown code yields `None` plus a warning.
    fn level(&self, code: i64) -> (Option<String>, Option<String>) {
        match self.registry.code_to_name(code) {
            Ok(name) => (Some(name.to_string()), None),
            Err(e) => (None, Some(e.to_string())),
        }
    }

    fn add(
        &self,
        parent: &str,
        user_id: i64,
        level: &str,
        expires_at: Option<&String>,
    ) -> Result<ApiMember, AdapterError> {
        let mut body = Map::new();
        body.insert("user_id".into(), json!(user_id));
        body.insert("access_level".into(), json!(self.code(level)?));
        put_opt(&mut body, "expires_at", expires_at.cloned());
        self.client.post(&self.collection_path(parent), &Value::Object(body))
    }

    fn get(&self, parent: &str, user_id: i64) -> Result<ApiMember, AdapterError> {
        self.client.get(&self.member_path(parent, user_id))
    }

    fn edit(
        &self,
        parent: &str,
        user_id: i64,
        changes: &FieldDiff,
    ) -> Result<ApiMember, AdapterError> {
        let mut body = Map::new();
        if let Some(level) = changes.get("access_level").and_then(FieldValue::as_str) {
            body.insert("access_level".into(), json!(self.code(level)?));
        }
        if let Some(expires) = changes.get("expires_at").and_then(FieldValue::as_str) {
            body.insert("expires_at".into(), json!(expires));
        }
        self.client
            .put(&self.member_path(parent, user_id), &Value::Object(body))
    }

    fn remove(&self, parent: &str, user_id: i64) -> Result<(), AdapterError> {
        self.client.delete(&self.member_path(parent, user_id))
    }
}

fn validate_common(
    parent: (&str, Option<&String>),
    user_id: Option<i64>,
    level: Option<&String>,
    excluded: &[&str],
    registry: &AccessLevelRegistry,
) -> reconcile::Result<()> {
    let (parent_field, parent) = parent;
    let parent = parent.ok_or_else(|| Error::validation(parent_field, "is required"))?;
    reconcile::identity::check_component(parent)?;
    match user_id {
        None => return Err(Error::validation("user_id", "is required")),
        Some(id) if id <= 0 => return Err(Error::validation("user_id", "must be a positive id")),
        Some(_) => {}
    }
    let level = level.ok_or_else(|| Error::validation("access_level", "is required"))?;
    registry.validate_name(level, excluded).map(|_| ())
}

// =============================================================================
// Project memberships
// =============================================================================

/// Adapter for `project_membership`
pub struct ProjectMembershipAdapter {
    members: Members,
}

impl ProjectMembershipAdapter {
    #[must_use]
    pub fn new(client: Client, registry: Arc<AccessLevelRegistry>) -> Self {
        Self {
            members: Members {
                client,
                registry,
                scope: Scope::Project,
            },
        }
    }

    fn observe(&self, project: String, member: ApiMember) -> Observed<ProjectMembership> {
        let (access_level, warning) = self.members.level(member.access_level);
        let observed = Observed::new(ProjectMembership {
            project: Some(project),
            user_id: Some(member.id),
            access_level,
        });
        match warning {
            Some(w) => observed.warn(w),
            None => observed,
        }
    }
}

impl RemoteAdapter for ProjectMembershipAdapter {
    type State = ProjectMembership;

    fn kind(&self) -> &'static str {
        PROJECT_KIND
    }

    fn fields(&self) -> &'static [Field<ProjectMembership>] {
        &PROJECT_FIELDS
    }

    fn describe(&self, state: &ProjectMembership) -> String {
        format!(
            "user {} on project {} as {}",
            state.user_id.unwrap_or_default(),
            state.project.as_deref().unwrap_or("?"),
            state.access_level.as_deref().unwrap_or("?")
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
        desired: &ProjectMembership,
        registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        validate_common(
            ("project", desired.project.as_ref()),
            desired.user_id,
            desired.access_level.as_ref(),
            &PROJECT_EXCLUDED,
            registry,
        )
    }

    fn create(
        &self,
        desired: &ProjectMembership,
    ) -> Result<Created<ProjectMembership>, AdapterError> {
        let project = needed(&desired.project, "project")?;
        let user_id = *needed(&desired.user_id, "user_id")?;
        let level = needed(&desired.access_level, "access_level")?;

        let member = self.members.add(project, user_id, level, None)?;
        let identity = encode_pair(project, &user_id.to_string()).map_err(invalid)?;
        Ok(Created {
            identity,
            echo: Some(self.observe(project.clone(), member).state),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<ProjectMembership>, AdapterError> {
        let (project, user_id) = Members::split(identity)?;
        let member = self.members.get(&project, user_id)?;
        Ok(self.observe(project, member))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<ProjectMembership>, AdapterError> {
        let (project, user_id) = Members::split(identity)?;
        let member = self.members.edit(&project, user_id, changes)?;
        Ok(self.observe(project, member))
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        let (project, user_id) = Members::split(identity)?;
        self.members.remove(&project, user_id)
    }
}

// =============================================================================
// Group memberships
// =============================================================================

/// Adapter for `group_membership`
pub struct GroupMembershipAdapter {
    members: Members,
}

impl GroupMembershipAdapter {
    #[must_use]
    pub fn new(client: Client, registry: Arc<AccessLevelRegistry>) -> Self {
        Self {
            members: Members {
                client,
                registry,
                scope: Scope::Group,
            },
        }
    }

    fn observe(&self, group: String, member: ApiMember) -> Observed<GroupMembership> {
        let (access_level, warning) = self.members.level(member.access_level);
        let observed = Observed::new(GroupMembership {
            group: Some(group),
            user_id: Some(member.id),
            access_level,
            expires_at: member.expires_at,
        });
        match warning {
            Some(w) => observed.warn(w),
            None => observed,
        }
    }
}

impl RemoteAdapter for GroupMembershipAdapter {
    type State = GroupMembership;

    fn kind(&self) -> &'static str {
        GROUP_KIND
    }

    fn fields(&self) -> &'static [Field<GroupMembership>] {
        &GROUP_FIELDS
    }

    fn describe(&self, state: &GroupMembership) -> String {
        format!(
            "user {} in group {} as {}",
            state.user_id.unwrap_or_default(),
            state.group.as_deref().unwrap_or("?"),
            state.access_level.as_deref().unwrap_or("?")
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
        desired: &GroupMembership,
        registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        validate_common(
            ("group", desired.group.as_ref()),
            desired.user_id,
            desired.access_level.as_ref(),
            &[],
            registry,
        )?;
        if let Some(expires) = &desired.expires_at {
            NaiveDate::parse_from_str(expires, "%Y-%m-%d").map_err(|_| {
                Error::validation("expires_at", format!("{expires:?} is not a YYYY-MM-DD date"))
            })?;
        }
        Ok(())
    }

    fn create(&self, desired: &GroupMembership) -> Result<Created<GroupMembership>, AdapterError> {
        let group = needed(&desired.group, "group")?;
        let user_id = *needed(&desired.user_id, "user_id")?;
        let level = needed(&desired.access_level, "access_level")?;

        let member = self
            .members
            .add(group, user_id, level, desired.expires_at.as_ref())?;
        let identity = encode_pair(group, &user_id.to_string()).map_err(invalid)?;
        Ok(Created {
            identity,
            echo: Some(self.observe(group.clone(), member).state),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<GroupMembership>, AdapterError> {
        let (group, user_id) = Members::split(identity)?;
        let member = self.members.get(&group, user_id)?;
        Ok(self.observe(group, member))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<GroupMembership>, AdapterError> {
        let (group, user_id) = Members::split(identity)?;
        let member = self.members.edit(&group, user_id, changes)?;
        Ok(self.observe(group, member))
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        let (group, user_id) = Members::split(identity)?;
        self.members.remove(&group, user_id)
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiMember {
    id: i64,
    access_level: i64,
    #[serde(default)]
    expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Method, MockBackend};
    use reconcile::{Instance, Orchestrator, Phase};

    fn project_adapter(mock: &MockBackend) -> ProjectMembershipAdapter {
        ProjectMembershipAdapter::new(
            Client::with_backend(Arc::new(mock.clone())),
            Arc::new(AccessLevelRegistry::gitlab()),
        )
    }

    fn group_adapter(mock: &MockBackend) -> GroupMembershipAdapter {
        GroupMembershipAdapter::new(
            Client::with_backend(Arc::new(mock.clone())),
            Arc::new(AccessLevelRegistry::gitlab()),
        )
    }

    fn alice() -> ProjectMembership {
        ProjectMembership {
            project: Some("group/app".into()),
            user_id: Some(7),
            access_level: Some("developer".into()),
        }
    }

    #[test]
    fn test_project_membership_create_sends_code() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Post,
            "projects/group%2Fapp/members",
            json!({"id": 7, "username": "alice", "access_level": 30}),
        );
        let created = project_adapter(&mock).create(&alice()).unwrap();

        assert_eq!(created.identity.as_str(), "group/app:7");
        assert_eq!(
            mock.last_body(Method::Post),
            Some(json!({"user_id": 7, "access_level": 30}))
        );
        assert_eq!(created.echo.unwrap().access_level.as_deref(), Some("developer"));
    }

    #[test]
    fn test_project_membership_rejects_owner() {
        let registry = AccessLevelRegistry::gitlab();
        let adapter = project_adapter(&MockBackend::new());
        let owner = ProjectMembership {
            access_level: Some("owner".into()),
            ..alice()
        };
        match adapter.validate(&owner, &registry).unwrap_err() {
            Error::UnknownAccessLevel { accepted, .. } => {
                assert!(accepted.contains(&"maintainer".to_string()));
                assert!(!accepted.contains(&"owner".to_string()));
            }
            other => panic!("Expected Error::UnknownAccessLevel, got {other:?}"),
        }

        let missing = ProjectMembership {
            user_id: None,
            ..alice()
        };
        assert!(adapter.validate(&missing, &registry).is_err());
        assert!(adapter.validate(&alice(), &registry).is_ok());
    }

    #[test]
    fn test_unknown_code_is_a_warning() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "projects/group%2Fapp/members/7",
            json!({"id": 7, "access_level": 60}),
        );
        let observed = project_adapter(&mock)
            .read(&Identity::new("group/app:7"))
            .unwrap();
        assert_eq!(observed.state.access_level, None);
        assert_eq!(observed.warnings.len(), 1);
    }

    #[test]
    fn test_level_change_is_updated_in_place() {
        let mock = MockBackend::new();
        let path = "projects/group%2Fapp/members/7";
        mock.respond(Method::Get, path, json!({"id": 7, "access_level": 30}));
        mock.respond(Method::Put, path, json!({"id": 7, "access_level": 40}));

        let adapter = project_adapter(&mock);
        let registry = AccessLevelRegistry::gitlab();
        let orch = Orchestrator::new(&adapter, &registry);
        let mut instance = Instance::tracked(Identity::new("group/app:7"));
        let desired = ProjectMembership {
            access_level: Some("Maintainer".into()),
            ..alice()
        };

        orch.update(&mut instance, &desired).unwrap();
        assert_eq!(mock.last_body(Method::Put), Some(json!({"access_level": 40})));
        assert_eq!(instance.phase, Phase::Present);
        assert_eq!(
            instance.observed.unwrap().access_level.as_deref(),
            Some("maintainer")
        );
    }

    #[test]
    fn test_changing_user_requires_replacement() {
        let adapter = project_adapter(&MockBackend::new());
        let registry = AccessLevelRegistry::gitlab();
        let orch = Orchestrator::new(&adapter, &registry);
        let instance = Instance::present(Identity::new("group/app:7"), alice());
        let bob = ProjectMembership {
            user_id: Some(8),
            ..alice()
        };
        assert_eq!(orch.replacement_fields(&instance, &bob), vec!["user_id"]);
    }

    #[test]
    fn test_malformed_identity_is_rejected() {
        let adapter = project_adapter(&MockBackend::new());
        assert!(adapter.check_identity(&Identity::new("group/app:seven")).is_err());
        assert!(adapter.check_identity(&Identity::new("group/app")).is_err());
        assert!(adapter.check_identity(&Identity::new("group/app:7")).is_ok());
        assert!(adapter.read(&Identity::new("7")).is_err());
    }

    #[test]
    fn test_group_membership_accepts_owner_and_expiry() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Post,
            "groups/platform/members",
            json!({"id": 7, "access_level": 50, "expires_at": "2030-01-31"}),
        );
        let adapter = group_adapter(&mock);
        let desired = GroupMembership {
            group: Some("platform".into()),
            user_id: Some(7),
            access_level: Some("owner".into()),
            expires_at: Some("2030-01-31".into()),
        };
        adapter
            .validate(&desired, &AccessLevelRegistry::gitlab())
            .unwrap();
        let created = adapter.create(&desired).unwrap();

        assert_eq!(created.identity.as_str(), "platform:7");
        assert_eq!(
            mock.last_body(Method::Post),
            Some(json!({"user_id": 7, "access_level": 50, "expires_at": "2030-01-31"}))
        );
    }

    #[test]
    fn test_group_membership_rejects_bad_expiry() {
        let adapter = group_adapter(&MockBackend::new());
        let desired = GroupMembership {
            group: Some("platform".into()),
            user_id: Some(7),
            access_level: Some("guest".into()),
            expires_at: Some("31/01/2030".into()),
        };
        let err = adapter
            .validate(&desired, &AccessLevelRegistry::gitlab())
            .unwrap_err();
        assert!(err.to_string().contains("expires_at"));
    }

    #[test]
    fn test_delete_confirms_absence() {
        let mock = MockBackend::new();
        let adapter = group_adapter(&mock);
        let registry = AccessLevelRegistry::gitlab();
        let orch = Orchestrator::new(&adapter, &registry);
        let mut instance = Instance::tracked(Identity::new("platform:7"));
        instance.phase = Phase::Present;

        orch.delete(&mut instance, &reconcile::CancelToken::new())
            .unwrap();
        assert_eq!(instance.phase, Phase::Gone);
        assert_eq!(mock.requests_for(Method::Delete)[0].path, "groups/platform/members/7");
    }
}
