//! Commands working on the state file: `import`, `refresh` and `show`

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use rayon::prelude::*;
use reconcile::planner::parse_target;
use reconcile::{BoxedResource, Identity, Snapshot, SnapshotUpdate};

use super::Workspace;
use crate::Context;
use crate::engine;
use crate::progress;
use crate::state::StateFile;
use crate::ui;

pub fn import(ctx: &Context, address: &str, identity: &str) -> Result<()> {
    let mut ws = Workspace::open(ctx)?;
    let kind = match parse_target(address) {
        (kind, Some(name)) if !name.is_empty() => kind,
        _ => anyhow::bail!("Address must look like kind.name, got '{address}'"),
    };
    if let Some(tracked) = ws.state.get(address) {
        anyhow::bail!("{address} is already tracked as {}", tracked.identity);
    }

    let prior = Snapshot {
        kind: kind.to_string(),
        identity: Identity::new(identity),
        observed: None,
    };
    let resource = ws.factory()?.build(address, None, Some(prior))?;

    let spinner = progress::spinner(format!("Reading {kind} {identity}..."));
    let update = resource.refresh();
    spinner.finish_and_clear();

    match update.with_context(|| format!("Failed to import {address}"))? {
        SnapshotUpdate::Set(snapshot) => {
            ws.state.record(address, SnapshotUpdate::Set(snapshot));
            ws.save_state()?;
            ui::success(&format!("Imported {address} ({identity})"));
            if !ws.manifest.contains(address) {
                ui::warn(&format!(
                    "{address} is not declared in the manifest; the next apply will delete it"
                ));
            }
            Ok(())
        }
        SnapshotUpdate::Remove => anyhow::bail!("{kind} {identity} does not exist in GitLab"),
        SnapshotUpdate::Keep => anyhow::bail!("{kind} {identity} could not be read"),
    }
}

/// Counts from one refresh pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Refresh every resource and fold the results into `state`
pub fn refresh_all(
    resources: &[BoxedResource],
    jobs: usize,
    state: &mut StateFile,
) -> Result<RefreshSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create refresh thread pool")?;
    let results: Vec<(String, Result<SnapshotUpdate>)> = pool.install(|| {
        resources
            .par_iter()
            .map(|r| (r.address().to_string(), r.refresh()))
            .collect()
    });

    let mut summary = RefreshSummary::default();
    for (address, result) in results {
        match result {
            Ok(SnapshotUpdate::Remove) => {
                log::info!("{address} no longer exists, dropping it");
                state.record(&address, SnapshotUpdate::Remove);
                summary.removed += 1;
            }
            Ok(update) => {
                if state.record(&address, update) {
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
            Err(e) => {
                ui::error(&format!("{e:#}"));
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

pub fn refresh(ctx: &Context, target: Option<&str>) -> Result<()> {
    let mut ws = Workspace::open(ctx)?;
    let factory = ws.factory()?;
    let plan = engine::tracked_plan(&ws.state, &factory, target)?;
    if plan.is_empty() {
        ui::info("Nothing tracked");
        return Ok(());
    }

    let spinner = progress::spinner(format!("Refreshing {} resources...", plan.total_resources()));
    let summary = refresh_all(&plan.resources, ws.settings.jobs, &mut ws.state);
    spinner.finish_and_clear();
    let summary = summary?;

    if summary.updated + summary.removed > 0 {
        ws.save_state()?;
    }

    ui::success(&format!(
        "{} updated, {} unchanged, {} gone",
        summary.updated, summary.unchanged, summary.removed
    ));
    if summary.failed > 0 {
        anyhow::bail!("{} resources could not be refreshed", summary.failed);
    }
    Ok(())
}

pub fn show(ctx: &Context, address: Option<&str>) -> Result<()> {
    let ws = Workspace::open(ctx)?;

    let Some(address) = address else {
        if ws.state.resources.is_empty() {
            ui::info("Nothing tracked");
            return Ok(());
        }
        ui::header("Tracked resources");
        for (address, tracked) in &ws.state.resources {
            let declared = if ws.manifest.contains(address) {
                String::new()
            } else {
                " (not declared)".yellow().to_string()
            };
            println!(
                "  {:<45} {:<20} {}{}",
                address.bold(),
                tracked.identity.to_string(),
                tracked.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                declared
            );
        }
        return Ok(());
    };

    let tracked = ws
        .state
        .get(address)
        .with_context(|| format!("{address} is not tracked"))?;
    ui::header(address);
    ui::kv("kind", &tracked.kind);
    ui::kv("identity", tracked.identity.as_str());
    ui::kv("updated", &tracked.updated_at.to_rfc3339());
    if let Some(entry) = ws.manifest.get(address) {
        ui::section("Declared");
        print!("{}", toml::to_string_pretty(&entry.attributes)?);
    } else {
        ui::warn("Not declared in the manifest; the next apply will delete it");
    }
    if let Some(observed) = &tracked.observed {
        ui::section("Observed");
        println!("{}", serde_json::to_string_pretty(observed)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::ResourceFactory;
    use labkit::{Client, Method, MockBackend};
    use reconcile::PollConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn track(state: &mut StateFile, address: &str, identity: &str) {
        state.record(
            address,
            SnapshotUpdate::Set(Snapshot {
                kind: "user_custom_attribute".into(),
                identity: Identity::new(identity),
                observed: None,
            }),
        );
    }

    #[test]
    fn test_refresh_updates_and_drops() {
        let mock = MockBackend::new();
        mock.respond(
            Method::Get,
            "users/7/custom_attributes/cost_center",
            json!({"key": "cost_center", "value": "R&D"}),
        );
        let client = Client::with_backend(Arc::new(mock.clone()));
        let factory = ResourceFactory::new(client, PollConfig::default());

        let mut state = StateFile::default();
        track(&mut state, "user_custom_attribute.cost_center", "7:cost_center");
        track(&mut state, "user_custom_attribute.team", "7:team");
        track(&mut state, "user_custom_attribute.broken", "alice:team");

        let plan = engine::tracked_plan(&state, &factory, None).unwrap();
        let summary = refresh_all(&plan.resources, 2, &mut state).unwrap();

        assert_eq!(
            summary,
            RefreshSummary {
                updated: 1,
                unchanged: 0,
                removed: 1,
                failed: 1,
            }
        );
        let observed = state
            .get("user_custom_attribute.cost_center")
            .and_then(|t| t.observed.clone())
            .unwrap();
        assert_eq!(observed["value"], "R&D");
        assert!(state.get("user_custom_attribute.team").is_none());
        assert!(state.get("user_custom_attribute.broken").is_some());
    }
}
