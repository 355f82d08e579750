//! Project badges

use crate::client::Client;
use crate::resources::{api_path, body_from, invalid, is_http_url, needed, required};
use reconcile::{
    AccessLevelRegistry, AdapterError, Created, Error, Field, FieldDiff, FieldValue, Identity,
    Observed, RemoteAdapter, decode_pair, encode_pair,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const KIND: &str = "project_badge";

/// A badge shown on a project's overview page
///
/// URLs may contain placeholders such as `%{project_path}`; the rendered
/// forms are filled in by GitLab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectBadge {
    pub project: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub rendered_link_url: Option<String>,
    pub rendered_image_url: Option<String>,
}

static FIELDS: [Field<ProjectBadge>; 5] = [
    Field::force_new("project", |s: &ProjectBadge| s.project.clone().map(FieldValue::from)),
    Field::mutable("link_url", |s: &ProjectBadge| s.link_url.clone().map(FieldValue::from)),
    Field::mutable("image_url", |s: &ProjectBadge| s.image_url.clone().map(FieldValue::from)),
    Field::computed("rendered_link_url", |s: &ProjectBadge| {
        s.rendered_link_url.clone().map(FieldValue::from)
    }),
    Field::computed("rendered_image_url", |s: &ProjectBadge| {
        s.rendered_image_url.clone().map(FieldValue::from)
    }),
];

/// Adapter for `project_badge`
pub struct ProjectBadgeAdapter {
    client: Client,
}

impl ProjectBadgeAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn badge_path(project: &str, badge_id: &str) -> String {
        api_path(&["projects", project, "badges", badge_id])
    }
}

impl RemoteAdapter for ProjectBadgeAdapter {
    type State = ProjectBadge;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn fields(&self) -> &'static [Field<ProjectBadge>] {
        &FIELDS
    }

    fn describe(&self, state: &ProjectBadge) -> String {
        format!(
            "badge {} on project {}",
            state.image_url.as_deref().unwrap_or("?"),
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
        desired: &ProjectBadge,
        _registry: &AccessLevelRegistry,
    ) -> reconcile::Result<()> {
        reconcile::identity::check_component(required(&desired.project, "project")?)?;
        for (field, url) in [("link_url", &desired.link_url), ("image_url", &desired.image_url)] {
            if !is_http_url(required(url, field)?) {
                return Err(Error::validation(field, "must be an http or https URL"));
            }
        }
        Ok(())
    }

    fn create(&self, desired: &ProjectBadge) -> Result<Created<ProjectBadge>, AdapterError> {
        let project = needed(&desired.project, "project")?;
        let body = json!({
            "link_url": needed(&desired.link_url, "link_url")?,
            "image_url": needed(&desired.image_url, "image_url")?,
        });
        let badge: ApiBadge = self
            .client
            .post(&api_path(&["projects", project, "badges"]), &body)?;
        Ok(Created {
            identity: encode_pair(project, &badge.id.to_string()).map_err(invalid)?,
            echo: Some(badge.into_state(project.clone())),
        })
    }

    fn read(&self, identity: &Identity) -> Result<Observed<ProjectBadge>, AdapterError> {
        let (project, badge_id) = decode_pair(identity).map_err(invalid)?;
        let badge: ApiBadge = self.client.get(&Self::badge_path(&project, &badge_id))?;
        Ok(Observed::new(badge.into_state(project)))
    }

    fn update(
        &self,
        identity: &Identity,
        changes: &FieldDiff,
    ) -> Result<Observed<ProjectBadge>, AdapterError> {
        let (project, badge_id) = decode_pair(identity).map_err(invalid)?;
        let body = Value::Object(body_from(changes, &["project"]));
        let badge: ApiBadge = self.client.put(&Self::badge_path(&project, &badge_id), &body)?;
        Ok(Observed::new(badge.into_state(project)))
    }

    fn delete(&self, identity: &Identity) -> Result<(), AdapterError> {
        let (project, badge_id) = decode_pair(identity).map_err(invalid)?;
        self.client.delete(&Self::badge_path(&project, &badge_id))
    }
}

// =============================================================================
// GitLab API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiBadge {
    id: i64,
    link_url: String,
    image_url: String,
    #[serde(default)]
    rendered_link_url: Option<String>,
    #[serde(default)]
    rendered_image_url: Option<String>,
}

impl ApiBadge {
    fn into_state(self, project: String) -> ProjectBadge {
        ProjectBadge {
            project: Some(project),
            link_url: Some(self.link_url),
            image_url: Some(self.image_url),
            rendered_link_url: self.rendered_link_url,
            rendered_image_url: self.rendered_image_url,
        }
    }
}
