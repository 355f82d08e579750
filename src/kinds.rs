//! Kind dispatch: turns a manifest entry and its tracked snapshot into an
//! engine resource bound to the right GitLab adapter.

use anyhow::{Context, Result};
use labkit::Client;
use labkit::resources::{
    deploy_key, group_variable, membership, project_badge, project_cluster, project_mirror,
    service_github, service_jira, service_pipelines_email, user, user_custom_attribute,
};
use reconcile::{AccessLevelRegistry, BoxedResource, Managed, PollConfig, RemoteAdapter, Snapshot};
use std::sync::Arc;

/// Builds resources that share one client, registry and poll config
pub struct ResourceFactory {
    client: Client,
    registry: Arc<AccessLevelRegistry>,
    poll: PollConfig,
}

impl ResourceFactory {
    pub fn new(client: Client, poll: PollConfig) -> Self {
        Self {
            client,
            registry: Arc::new(AccessLevelRegistry::gitlab()),
            poll,
        }
    }

    /// Build the resource at `address` (`kind.name`).
    ///
    /// `desired` is `None` for resources that are tracked but no longer
    /// declared; `prior` is `None` for resources not yet created.
    pub fn build(
        &self,
        address: &str,
        desired: Option<&toml::Table>,
        prior: Option<Snapshot>,
    ) -> Result<BoxedResource> {
        let (kind, _) = reconcile::planner::parse_target(address);
        let client = self.client.clone();
        match kind {
            membership::PROJECT_KIND => self.managed(
                membership::ProjectMembershipAdapter::new(client, Arc::clone(&self.registry)),
                address,
                desired,
                prior,
            ),
            membership::GROUP_KIND => self.managed(
                membership::GroupMembershipAdapter::new(client, Arc::clone(&self.registry)),
                address,
                desired,
                prior,
            ),
            group_variable::KIND => self.managed(
                group_variable::GroupVariableAdapter::new(client),
                address,
                desired,
                prior,
            ),
            deploy_key::KIND => self.managed(
                deploy_key::DeployKeyAdapter::new(client),
                address,
                desired,
                prior,
            ),
            project_badge::KIND => self.managed(
                project_badge::ProjectBadgeAdapter::new(client),
                address,
                desired,
                prior,
            ),
            project_mirror::KIND => self.managed(
                project_mirror::ProjectMirrorAdapter::new(client),
                address,
                desired,
                prior,
            ),
            project_cluster::KIND => self.managed(
                project_cluster::ProjectClusterAdapter::new(client),
                address,
                desired,
                prior,
            ),
            service_github::KIND => self.managed(
                service_github::GithubServiceAdapter::new(client),
                address,
                desired,
                prior,
            ),
            service_jira::KIND => self.managed(
                service_jira::JiraServiceAdapter::new(client),
                address,
                desired,
                prior,
            ),
            service_pipelines_email::KIND => self.managed(
                service_pipelines_email::PipelinesEmailServiceAdapter::new(client),
                address,
                desired,
                prior,
            ),
            user::KIND => self.managed(user::UserAdapter::new(client), address, desired, prior),
            user_custom_attribute::KIND => self.managed(
                user_custom_attribute::UserCustomAttributeAdapter::new(client),
                address,
                desired,
                prior,
            ),
            other => anyhow::bail!(
                "Unknown resource kind '{other}' in {address} (known kinds: {})",
                labkit::KINDS.join(", ")
            ),
        }
    }

    fn managed<A>(
        &self,
        adapter: A,
        address: &str,
        desired: Option<&toml::Table>,
        prior: Option<Snapshot>,
    ) -> Result<BoxedResource>
    where
        A: RemoteAdapter + 'static,
    {
        let mut resource = Managed::new(address, Arc::new(adapter), Arc::clone(&self.registry))
            .poll_config(self.poll)
            .prior(prior);
        if let Some(table) = desired {
            let state: A::State = toml::Value::Table(table.clone())
                .try_into()
                .with_context(|| format!("Invalid attributes for {address}"))?;
            resource = resource.desired(state);
        }
        Ok(Box::new(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labkit::{Method, MockBackend};
    use reconcile::{Change, Identity};
    use serde_json::json;

    fn factory(mock: &MockBackend) -> ResourceFactory {
        ResourceFactory::new(Client::with_backend(Arc::new(mock.clone())), PollConfig::default())
    }

    fn table(content: &str) -> toml::Table {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_every_kind_builds() {
        let factory = factory(&MockBackend::new());
        for kind in labkit::KINDS {
            let resource = factory.build(&format!("{kind}.x"), None, None).unwrap();
            assert_eq!(resource.kind(), kind);
            assert_eq!(resource.plan(), Change::NoOp);
        }
    }

    #[test]
    fn test_unknown_kind_and_bad_attributes() {
        let factory = factory(&MockBackend::new());
        assert!(factory.build("project_member.alice", None, None).is_err());

        let typo = table("project = \"42\"\nuser_id = 7\naccess_levle = \"developer\"\n");
        let err = factory
            .build("project_membership.alice", Some(&typo), None)
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("access_levle"));
    }

    #[test]
    fn test_declared_membership_plans_create() {
        let factory = factory(&MockBackend::new());
        let alice = table("project = \"42\"\nuser_id = 7\naccess_level = \"developer\"\n");
        let resource = factory
            .build("project_membership.alice", Some(&alice), None)
            .unwrap();
        assert_eq!(resource.plan(), Change::Create);
        assert_eq!(resource.address(), "project_membership.alice");
    }

    #[test]
    fn test_invalid_access_level_plans_unknown() {
        let factory = factory(&MockBackend::new());
        let owner = table("project = \"42\"\nuser_id = 7\naccess_level = \"owner\"\n");
        let resource = factory
            .build("project_membership.alice", Some(&owner), None)
            .unwrap();
        assert!(matches!(resource.plan(), Change::Unknown { .. }));
    }

    #[test]
    fn test_tracked_but_undeclared_plans_delete() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "groups/acme/variables/DEPLOY_ENV",
            json!({"key": "DEPLOY_ENV", "value": "production", "variable_type": "env_var",
                   "protected": false, "masked": false}),
        );
        let prior = Snapshot {
            kind: "group_variable".into(),
            identity: Identity::new("acme:DEPLOY_ENV"),
            observed: None,
        };
        let resource = factory(&mock)
            .build("group_variable.deploy_env", None, Some(prior))
            .unwrap();
        assert_eq!(resource.plan(), Change::Delete);
    }
}
