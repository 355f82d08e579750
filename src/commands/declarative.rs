//! Declarative commands
//!
//! - `plan` - Show what apply would change
//! - `apply` - Make GitLab match the manifest
//! - `destroy` - Delete everything gitform tracks

use anyhow::Result;
use reconcile::ChangeSummary;

use super::Workspace;
use crate::Context;
use crate::engine::{self, RunOptions};
use crate::ui;

pub fn plan(ctx: &Context, target: Option<&str>) -> Result<()> {
    let ws = Workspace::open(ctx)?;
    let factory = ws.factory()?;
    let plan = engine::desired_plan(&ws.manifest, &ws.state, &factory, target)?;

    if !ctx.quiet {
        ui::header("gitform plan");
    }
    if plan.is_empty() {
        ui::info("Nothing declared or tracked");
        return Ok(());
    }

    let changes = engine::plan_changes(&plan, ws.settings.jobs)?;
    engine::differ::display_changes(&changes);

    let summary = ChangeSummary::from_changes(&changes);
    if summary.errors > 0 {
        anyhow::bail!("{} resources could not be planned", summary.errors);
    }
    Ok(())
}

pub fn apply(
    ctx: &Context,
    target: Option<&str>,
    dry_run: bool,
    yes: bool,
    jobs: Option<usize>,
) -> Result<()> {
    let mut ws = Workspace::open(ctx)?;
    let factory = ws.factory()?;
    let plan = engine::desired_plan(&ws.manifest, &ws.state, &factory, target)?;

    if !ctx.quiet {
        ui::header("gitform apply");
    }
    if plan.is_empty() {
        ui::info("Nothing declared or tracked");
        return Ok(());
    }
    if ws.manifest.is_empty() && target.is_none() {
        ui::warn("The manifest declares nothing; every tracked resource will be deleted");
    }

    let opts = RunOptions {
        dry_run,
        jobs: jobs.unwrap_or(ws.settings.jobs),
        yes,
        prompt: "Apply these changes?",
        done: "GitLab matches the manifest",
    };
    let summary = engine::run(plan, &opts, &ctx.cancel, &mut ws.state)?;
    if !dry_run {
        ws.save_state()?;
    }
    if ctx.cancel.is_cancelled() {
        anyhow::bail!("Interrupted; state was saved for the resources that finished");
    }

    if !summary.is_success() {
        anyhow::bail!("{} resources failed", summary.failed);
    }
    Ok(())
}

pub fn destroy(ctx: &Context, target: Option<&str>, yes: bool) -> Result<()> {
    let mut ws = Workspace::open(ctx)?;
    let factory = ws.factory()?;
    let plan = engine::tracked_plan(&ws.state, &factory, target)?;

    if !ctx.quiet {
        ui::header("gitform destroy");
    }
    if plan.is_empty() {
        ui::info("Nothing tracked");
        return Ok(());
    }

    let opts = RunOptions {
        dry_run: false,
        jobs: ws.settings.jobs,
        yes,
        prompt: "Delete these resources from GitLab?",
        done: "Everything tracked was deleted",
    };
    let summary = engine::run(plan, &opts, &ctx.cancel, &mut ws.state)?;
    ws.save_state()?;
    if ctx.cancel.is_cancelled() {
        anyhow::bail!("Interrupted; state was saved for the resources that finished");
    }

    if !summary.is_success() {
        anyhow::bail!("{} resources failed", summary.failed);
    }
    Ok(())
}
