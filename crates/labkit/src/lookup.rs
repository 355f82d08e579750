//! Read-only lookups of GitLab objects gitform does not manage
//!
//! Groups, projects, branches and group member lists are fetched by id or
//! path and returned as plain serializable values, for inspecting the ids
//! a manifest needs.

use crate::client::Client;
use crate::resources::{api_path, invalid};
use reconcile::{AccessLevelRegistry, AdapterError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Result<T> = std::result::Result<T, AdapterError>;

/// Page size for list endpoints (the GitLab maximum).
const PER_PAGE: usize = 100;

/// A group, looked up by numeric id or full path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: i64,
    pub full_path: String,
    pub name: String,
    pub full_name: String,
    pub path: String,
    pub description: Option<String>,
    pub web_url: String,
    pub lfs_enabled: bool,
    pub request_access_enabled: bool,
    #[serde(alias = "visibility")]
    pub visibility_level: String,
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runners_token: Option<String>,
}

/// Push rules of a project (a paid-tier feature, absent elsewhere)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushRules {
    pub author_email_regex: Option<String>,
    pub branch_name_regex: Option<String>,
    pub commit_message_regex: Option<String>,
    pub commit_message_negative_regex: Option<String>,
    pub file_name_regex: Option<String>,
    pub commit_committer_check: bool,
    pub deny_delete_tag: bool,
    pub member_check: bool,
    pub prevent_secrets: bool,
    pub reject_unsigned_commits: bool,
    pub max_file_size: i64,
}

/// A project, looked up by numeric id or `namespace/path`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    pub description: String,
    pub default_branch: String,
    pub namespace_id: i64,
    pub visibility_level: String,
    pub request_access_enabled: bool,
    pub issues_enabled: bool,
    pub merge_requests_enabled: bool,
    pub pipelines_enabled: bool,
    pub wiki_enabled: bool,
    pub snippets_enabled: bool,
    pub lfs_enabled: bool,
    pub archived: bool,
    pub remove_source_branch_after_merge: bool,
    pub ssh_url_to_repo: String,
    pub http_url_to_repo: String,
    pub web_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runners_token: Option<String>,
    pub push_rules: Option<PushRules>,
}

/// Head commit of a branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commit {
    pub id: String,
    pub short_id: String,
    pub title: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_date: String,
    pub committer_name: String,
    pub committer_email: String,
    pub committed_date: String,
    pub parent_ids: Vec<String>,
}

/// A repository branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub name: String,
    pub merged: bool,
    pub protected: bool,
    pub default: bool,
    pub developers_can_push: bool,
    pub developers_can_merge: bool,
    pub can_push: bool,
    pub web_url: String,
    pub commit: Commit,
}

/// One member of a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub state: String,
    pub avatar_url: String,
    pub web_url: String,
    /// `None` when GitLab reports a level this build does not know
    pub access_level: Option<String>,
    pub expires_at: Option<String>,
}

/// Members of a group, optionally filtered to one access level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupMembers {
    pub group_id: i64,
    pub full_path: String,
    pub members: Vec<Member>,
}

/// Read-only GitLab lookups
#[derive(Debug, Clone)]
pub struct Lookup {
    client: Client,
    registry: Arc<AccessLevelRegistry>,
}

impl Lookup {
    pub fn new(client: Client, registry: Arc<AccessLevelRegistry>) -> Self {
        Self { client, registry }
    }

    pub fn group(&self, group: &str) -> Result<Group> {
        let group = non_blank(group, "group")?;
        log::debug!("looking up group {group}");
        self.client.get(&api_path(&["groups", group]))
    }

    /// Project plus its push rules; missing push rules are not an error.
    pub fn project(&self, project: &str) -> Result<Project> {
        let project = non_blank(project, "project")?;
        log::debug!("looking up project {project}");
        let found: ApiProject = self.client.get(&api_path(&["projects", project]))?;

        let push_rules_path = api_path(&["projects", &found.id.to_string(), "push_rule"]);
        let push_rules = match self.client.get::<Option<PushRules>>(&push_rules_path) {
            Ok(rules) => rules,
            Err(AdapterError::NotFound) => {
                log::debug!("project {} has no push rules", found.id);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(found.into_project(push_rules))
    }

    pub fn branch(&self, project: &str, name: &str) -> Result<Branch> {
        let project = non_blank(project, "project")?;
        let name = non_blank(name, "branch")?;
        log::debug!("looking up branch {name} of {project}");
        self.client
            .get(&api_path(&["projects", project, "repository", "branches", name]))
    }

    /// Every member of `group`, or only those at `access_level`.
    ///
    /// The access level is checked before any request is made.
    pub fn group_members(&self, group: &str, access_level: Option<&str>) -> Result<GroupMembers> {
        let wanted = access_level
            .map(|name| self.registry.name_to_code(name))
            .transpose()
            .map_err(invalid)?;
        let group = self.group(group)?;

        let mut members = Vec::new();
        for page in 1.. {
            let path = format!(
                "{}?per_page={PER_PAGE}&page={page}",
                api_path(&["groups", &group.id.to_string(), "members"])
            );
            let batch: Vec<ApiMember> = self.client.get(&path)?;
            let last = batch.len() < PER_PAGE;
            members.extend(
                batch
                    .into_iter()
                    .filter(|m| wanted.is_none_or(|code| m.access_level == code))
                    .map(|m| self.member(m)),
            );
            if last {
                break;
            }
        }

        Ok(GroupMembers {
            group_id: group.id,
            full_path: group.full_path,
            members,
        })
    }

    fn member(&self, api: ApiMember) -> Member {
        let access_level = match self.registry.code_to_name(api.access_level) {
            Ok(name) => Some(name.to_string()),
            Err(e) => {
                log::warn!("member {}: {e}", api.username);
                None
            }
        };
        Member {
            id: api.id,
            username: api.username,
            name: api.name,
            state: api.state,
            avatar_url: api.avatar_url.unwrap_or_default(),
            web_url: api.web_url,
            access_level,
            expires_at: api.expires_at,
        }
    }
}

fn non_blank<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AdapterError::request(format!("{what} is required")));
    }
    Ok(value)
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiNamespace {
    id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiProject {
    id: i64,
    name: String,
    path: String,
    path_with_namespace: String,
    description: Option<String>,
    default_branch: Option<String>,
    namespace: ApiNamespace,
    visibility: String,
    request_access_enabled: bool,
    issues_enabled: bool,
    merge_requests_enabled: bool,
    jobs_enabled: bool,
    wiki_enabled: bool,
    snippets_enabled: bool,
    lfs_enabled: bool,
    archived: bool,
    remove_source_branch_after_merge: Option<bool>,
    ssh_url_to_repo: String,
    http_url_to_repo: String,
    web_url: String,
    runners_token: Option<String>,
}

impl ApiProject {
    fn into_project(self, push_rules: Option<PushRules>) -> Project {
        Project {
            id: self.id,
            name: self.name,
            path: self.path,
            path_with_namespace: self.path_with_namespace,
            description: self.description.unwrap_or_default(),
            default_branch: self.default_branch.unwrap_or_default(),
            namespace_id: self.namespace.id,
            visibility_level: self.visibility,
            request_access_enabled: self.request_access_enabled,
            issues_enabled: self.issues_enabled,
            merge_requests_enabled: self.merge_requests_enabled,
            pipelines_enabled: self.jobs_enabled,
            wiki_enabled: self.wiki_enabled,
            snippets_enabled: self.snippets_enabled,
            lfs_enabled: self.lfs_enabled,
            archived: self.archived,
            remove_source_branch_after_merge: self
                .remove_source_branch_after_merge
                .unwrap_or(false),
            ssh_url_to_repo: self.ssh_url_to_repo,
            http_url_to_repo: self.http_url_to_repo,
            web_url: self.web_url,
            runners_token: self.runners_token,
            push_rules,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    id: i64,
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    web_url: String,
    access_level: i64,
    #[serde(default)]
    expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Method, MockBackend};
    use serde_json::json;

    fn lookup(mock: &MockBackend) -> Lookup {
        Lookup::new(
            Client::with_backend(Arc::new(mock.clone())),
            Arc::new(AccessLevelRegistry::gitlab()),
        )
    }

    fn platform_group() -> serde_json::Value {
        json!({
            "id": 7,
            "name": "Platform",
            "path": "platform",
            "full_name": "Acme / Platform",
            "full_path": "acme/platform",
            "description": "",
            "visibility": "internal",
            "lfs_enabled": true,
            "request_access_enabled": false,
            "parent_id": 3,
            "web_url": "https://gitlab.com/groups/acme/platform"
        })
    }

    #[test]
    fn test_group_by_full_path() {
        let mock = MockBackend::new();
        mock.respond(Method::Get, "groups/acme%2Fplatform", platform_group());

        let group = lookup(&mock).group("acme/platform").unwrap();
        assert_eq!(group.id, 7);
        assert_eq!(group.visibility_level, "internal");
        assert_eq!(group.parent_id, Some(3));
        assert_eq!(group.runners_token, None);
    }

    #[test]
    fn test_blank_ids_rejected_without_requests() {
        let mock = MockBackend::new();
        let lookup = lookup(&mock);
        assert!(matches!(lookup.group("  "), Err(AdapterError::Request { .. })));
        assert!(lookup.branch("42", "").is_err());
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_project_with_push_rules() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "projects/acme%2Fapp",
            json!({
                "id": 42,
                "name": "app",
                "path": "app",
                "path_with_namespace": "acme/app",
                "description": null,
                "default_branch": "main",
                "namespace": {"id": 3, "kind": "group"},
                "visibility": "private",
                "jobs_enabled": true,
                "issues_enabled": true,
                "archived": false,
                "web_url": "https://gitlab.com/acme/app"
            }),
        );
        mock.respond(
            Method::Get,
            "projects/42/push_rule",
            json!({"deny_delete_tag": true, "max_file_size": 50, "file_name_regex": null}),
        );

        let project = lookup(&mock).project("acme/app").unwrap();
        assert_eq!(project.namespace_id, 3);
        assert_eq!(project.description, "");
        assert!(project.pipelines_enabled);
        let rules = project.push_rules.unwrap();
        assert!(rules.deny_delete_tag);
        assert_eq!(rules.max_file_size, 50);
        assert_eq!(rules.file_name_regex, None);
    }

    #[test]
    fn test_project_without_push_rules() {
        let mock = MockBackend::new();
        mock.respond(Method::Get, "projects/42", json!({"id": 42, "name": "app"}));

        let project = lookup(&mock).project("42").unwrap();
        assert_eq!(project.push_rules, None);
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn test_project_push_rules_failure_propagates() {
        let mock = MockBackend::new();
        mock.respond(Method::Get, "projects/42", json!({"id": 42, "name": "app"}));
        mock.fail(Method::Get, "projects/42/push_rule", AdapterError::transport("reset"));

        assert!(lookup(&mock).project("42").unwrap_err().is_retryable());
    }

    #[test]
    fn test_branch_with_slash_in_name() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "projects/42/repository/branches/release%2F1.0",
            json!({
                "name": "release/1.0",
                "protected": true,
                "commit": {"id": "a1b2c3", "short_id": "a1b2", "parent_ids": ["ffee"]}
            }),
        );

        let branch = lookup(&mock).branch("42", "release/1.0").unwrap();
        assert!(branch.protected);
        assert!(!branch.merged);
        assert_eq!(branch.commit.short_id, "a1b2");
        assert_eq!(branch.commit.parent_ids, vec!["ffee"]);
    }

    #[test]
    fn test_group_members_filtered_by_level() {
        let mock = MockBackend::new();
        mock.respond(Method::Get, "groups/acme%2Fplatform", platform_group());
        mock.respond(
            Method::Get,
            "groups/7/members?per_page=100&page=1",
            json!([
                {"id": 1, "username": "alice", "access_level": 30, "state": "active"},
                {"id": 2, "username": "bob", "access_level": 40, "expires_at": "2030-01-01"},
                {"id": 3, "username": "carol", "access_level": 30}
            ]),
        );

        let found = lookup(&mock)
            .group_members("acme/platform", Some("developer"))
            .unwrap();
        assert_eq!(found.group_id, 7);
        assert_eq!(found.full_path, "acme/platform");
        let names: Vec<&str> = found.members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);
        assert_eq!(found.members[0].access_level.as_deref(), Some("developer"));
    }

    #[test]
    fn test_group_members_pages_and_unknown_levels() {
        let mock = MockBackend::new();
        mock.respond(Method::Get, "groups/7", platform_group());
        let full_page: Vec<_> = (0..100)
            .map(|i| json!({"id": i, "username": format!("user{i}"), "access_level": 10}))
            .collect();
        mock.respond(
            Method::Get,
            "groups/7/members?per_page=100&page=1",
            json!(full_page),
        );
        mock.respond(
            Method::Get,
            "groups/7/members?per_page=100&page=2",
            json!([{"id": 500, "username": "auditor", "access_level": 15}]),
        );

        let found = lookup(&mock).group_members("7", None).unwrap();
        assert_eq!(found.members.len(), 101);
        assert_eq!(found.members[100].access_level, None);
    }

    #[test]
    fn test_group_members_rejects_unknown_level_first() {
        let mock = MockBackend::new();
        let err = lookup(&mock)
            .group_members("acme", Some("wizard"))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Request { .. }));
        assert!(mock.requests().is_empty());
    }
}
