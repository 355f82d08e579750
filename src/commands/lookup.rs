//! `gitform lookup`: read-only queries printed as JSON

use anyhow::{Context, Result};
use labkit::Lookup;
use reconcile::AccessLevelRegistry;
use serde::Serialize;
use std::sync::Arc;

use crate::cli::LookupKind;
use crate::config::Settings;

pub fn run(kind: &LookupKind) -> Result<()> {
    let settings = Settings::load()?;
    let lookup = Lookup::new(
        super::client(&settings)?,
        Arc::new(AccessLevelRegistry::gitlab()),
    );
    let json = query(&lookup, kind)?;
    println!("{json}");
    Ok(())
}

fn query(lookup: &Lookup, kind: &LookupKind) -> Result<String> {
    match kind {
        LookupKind::Group { id } => {
            pretty(lookup.group(id).with_context(|| format!("Group {id}"))?)
        }
        LookupKind::Project { id } => {
            pretty(lookup.project(id).with_context(|| format!("Project {id}"))?)
        }
        LookupKind::Branch { project, name } => pretty(
            lookup
                .branch(project, name)
                .with_context(|| format!("Branch {name} of {project}"))?,
        ),
        LookupKind::GroupMembers {
            group,
            access_level,
        } => pretty(
            lookup
                .group_members(group, access_level.as_deref())
                .with_context(|| format!("Members of {group}"))?,
        ),
    }
}

fn pretty(value: impl Serialize) -> Result<String> {
    serde_json::to_string_pretty(&value).context("Failed to serialize lookup result")
}
