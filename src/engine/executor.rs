//! Execution engine - gitform executor with UI integration

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::ProgressBar;
use reconcile::{
    ApplyResult, CANCELLED, CancelToken, Change, ConfirmCallback, Execution, ExecuteOptions,
    ExecuteSummary, ExecutionPlan, ProgressCallback, ResourceChange, compute_changes,
};

use super::differ::display_changes;
use crate::progress;
use crate::state::StateFile;

/// Options for a terminal run (`yes` skips the confirmation prompt)
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub jobs: usize,
    pub yes: bool,
    pub prompt: &'static str,
    /// Printed when every resource succeeded
    pub done: &'static str,
}

/// Indicatif bar fed by the engine's progress callbacks
#[derive(Default)]
struct TerminalProgress {
    bar: Option<ProgressBar>,
}

impl ProgressCallback for TerminalProgress {
    fn on_batch_start(&mut self, count: usize) {
        self.bar = Some(progress::bar(count as u64, "Applying"));
    }

    fn on_resource_start(&mut self, address: &str, _description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(address.to_string());
        }
    }

    fn on_resource_complete(&mut self, address: &str, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::NoChange => "○",
            ApplyResult::Created
            | ApplyResult::Modified
            | ApplyResult::Replaced
            | ApplyResult::Removed => "✓",
            ApplyResult::Failed { .. } => "✗",
            ApplyResult::Skipped { .. } => "⊘",
        };
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{symbol} {address}"));
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Confirmation through dialoguer, unless `--yes`
struct TerminalConfirm {
    yes: bool,
    prompt: &'static str,
}

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        println!();
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(self.prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

/// Plan every resource behind a spinner (planning reads remote state)
pub fn plan_changes(plan: &ExecutionPlan, jobs: usize) -> Result<Vec<ResourceChange>> {
    let pool = rayon_pool(jobs)?;
    let spinner = progress::spinner(format!(
        "Reading {} resources from GitLab...",
        plan.total_resources()
    ));
    let changes = pool.install(|| compute_changes(&plan.resources));
    spinner.finish_and_clear();
    Ok(changes)
}

fn rayon_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create planning thread pool")
}

/// Show the plan, confirm, apply, and record every outcome in `state`
pub fn run(
    plan: ExecutionPlan,
    opts: &RunOptions,
    cancel: &CancelToken,
    state: &mut StateFile,
) -> Result<ExecuteSummary> {
    let changes = plan_changes(&plan, opts.jobs)?;
    display_changes(&changes);

    if changes.iter().all(|c| !c.change.is_change()) {
        let failed = changes
            .iter()
            .filter(|c| matches!(c.change, Change::Unknown { .. }))
            .count();
        return Ok(ExecuteSummary {
            failed,
            no_change: changes.len() - failed,
            ..Default::default()
        });
    }

    let engine_opts = ExecuteOptions {
        dry_run: opts.dry_run,
        jobs: opts.jobs,
    };
    let mut progress = TerminalProgress::default();
    let mut confirm = TerminalConfirm {
        yes: opts.yes,
        prompt: opts.prompt,
    };
    let execution = reconcile::execute(plan, engine_opts, cancel, &mut progress, &mut confirm)?;

    record_outcomes(&execution, state);
    print_summary(&execution, opts);
    Ok(execution.summary)
}

/// Apply snapshot updates; returns how many entries changed
pub fn record_outcomes(execution: &Execution, state: &mut StateFile) -> usize {
    execution
        .outcomes
        .iter()
        .filter(|outcome| state.record(&outcome.address, outcome.applied.snapshot.clone()))
        .count()
}

/// Resources skipped because the run was cancelled
fn interrupted(execution: &Execution) -> usize {
    execution
        .outcomes
        .iter()
        .filter(|o| {
            matches!(&o.applied.result, ApplyResult::Skipped { reason } if reason == CANCELLED)
        })
        .count()
}

fn print_summary(execution: &Execution, opts: &RunOptions) {
    let summary = &execution.summary;

    for outcome in &execution.outcomes {
        if let ApplyResult::Failed { error } = &outcome.applied.result {
            println!("  {} {}: {}", "✗".red(), outcome.address.bold(), error);
        }
    }

    println!();
    if opts.dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return;
    }
    let not_applied = interrupted(execution);
    if not_applied > 0 {
        println!(
            "  {} Interrupted - {} resources were not applied",
            "⚠".yellow().bold(),
            not_applied
        );
    }
    if summary.skipped > 0 && summary.total_changes() == 0 && summary.failed == 0 {
        println!("  {} Aborted", "✗".red());
        return;
    }
    if summary.is_success() {
        println!("  {} {}", "✓".green().bold(), opts.done);
    } else {
        println!("  {} Applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{Applied, Identity, Outcome, Snapshot, SnapshotUpdate};

    fn outcome(address: &str, result: ApplyResult, snapshot: SnapshotUpdate) -> Outcome {
        Outcome {
            address: address.to_string(),
            kind: "user",
            applied: Applied::new(result, snapshot),
        }
    }

    #[test]
    fn test_record_outcomes() {
        let mut state = StateFile::default();
        state.record(
            "user.bob",
            SnapshotUpdate::Set(Snapshot {
                kind: "user".into(),
                identity: Identity::new("8"),
                observed: None,
            }),
        );

        let execution = Execution {
            summary: ExecuteSummary::default(),
            outcomes: vec![
                outcome(
                    "user.alice",
                    ApplyResult::Created,
                    SnapshotUpdate::Set(Snapshot {
                        kind: "user".into(),
                        identity: Identity::new("7"),
                        observed: None,
                    }),
                ),
                outcome("user.bob", ApplyResult::Removed, SnapshotUpdate::Remove),
                outcome(
                    "user.carol",
                    ApplyResult::Failed {
                        error: "HTTP 500".into(),
                    },
                    SnapshotUpdate::Keep,
                ),
            ],
        };

        assert_eq!(record_outcomes(&execution, &mut state), 2);
        let addresses: Vec<&str> = state.addresses().collect();
        assert_eq!(addresses, vec!["user.alice"]);
    }

    #[test]
    fn test_interrupted_counts_cancelled_skips() {
        let execution = Execution {
            summary: ExecuteSummary::default(),
            outcomes: vec![
                outcome("user.a", Applied::skipped(CANCELLED).result, SnapshotUpdate::Keep),
                outcome("user.b", Applied::skipped("Declined").result, SnapshotUpdate::Keep),
                outcome("user.c", ApplyResult::NoChange, SnapshotUpdate::Keep),
            ],
        };
        assert_eq!(interrupted(&execution), 1);
    }

    #[test]
    fn test_yes_skips_prompt() {
        let mut confirm = TerminalConfirm {
            yes: true,
            prompt: "Apply these changes?",
        };
        assert!(confirm.confirm("ignored").unwrap());
    }
}
