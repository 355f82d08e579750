//! Execution engine - applies resources in parallel

use crate::changes::compute_changes;
use crate::context::{ApplyContext, AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::planner::ExecutionPlan;
use crate::poller::CancelToken;
use crate::resource::Resource;
use crate::types::{Applied, ApplyResult, Change, ExecuteOptions, ExecuteSummary, SnapshotUpdate};
use anyhow::Result;
use rayon::prelude::*;

/// Skip reason for resources not started because the run was cancelled
pub const CANCELLED: &str = "Cancelled";

/// What happened to one resource
#[derive(Debug, Clone)]
pub struct Outcome {
    pub address: String,
    pub kind: &'static str,
    pub applied: Applied,
}

/// Result of a run: counts plus per-resource snapshot changes to persist
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub summary: ExecuteSummary,
    pub outcomes: Vec<Outcome>,
}

impl Execution {
    fn record(&mut self, resource: &dyn Resource, applied: Applied) {
        self.summary.add_result(&applied.result);
        self.outcomes.push(Outcome {
            address: resource.address().to_string(),
            kind: resource.kind(),
            applied,
        });
    }
}

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - The execution plan to run
/// * `opts` - Execution options (dry_run, jobs)
/// * `cancel` - Shared token that interrupts pending deletion waits
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
pub fn execute<P, C>(
    plan: ExecutionPlan,
    opts: ExecuteOptions,
    cancel: &CancelToken,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Execution>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    let changes = pool.install(|| compute_changes(&plan.resources));
    let mut execution = Execution::default();

    // Resources whose state could not be determined are reported, not applied.
    for resource in &plan.resources {
        if let Change::Unknown { error } = resource.plan() {
            execution.record(
                resource.as_ref(),
                Applied::new(ApplyResult::Failed { error }, SnapshotUpdate::Keep),
            );
        }
    }

    let pending: Vec<&dyn Resource> = plan
        .resources
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| r.plan().is_change())
        .collect();

    if pending.is_empty() {
        return Ok(execution);
    }

    log::debug!("{} of {} resources need changes", pending.len(), changes.len());

    // Confirm before proceeding (unless dry_run or already cancelled)
    let skip_reason = if opts.dry_run {
        Some("Dry run")
    } else if cancel.is_cancelled() {
        Some(CANCELLED)
    } else if !confirm.confirm("Apply changes?")? {
        Some("Declined")
    } else {
        None
    };
    if let Some(reason) = skip_reason {
        for resource in pending {
            execution.record(resource, Applied::skipped(reason));
        }
        return Ok(execution);
    }

    let ctx = ApplyContext::new(false, cancel.clone());
    let (parallel, sequential): (Vec<&dyn Resource>, Vec<&dyn Resource>) =
        pending.into_iter().partition(|r| r.can_parallelize());

    progress.on_batch_start(parallel.len() + sequential.len());

    // Progress is not thread-safe, so parallel results are reported after.
    let results: Vec<Applied> = pool.install(|| {
        parallel
            .par_iter()
            .map(|resource| apply_resource(*resource, &ctx))
            .collect()
    });
    for (resource, applied) in parallel.iter().zip(results) {
        progress.on_resource_complete(resource.address(), &applied.result);
        execution.record(*resource, applied);
    }

    for resource in sequential {
        progress.on_resource_start(resource.address(), &resource.description());
        let applied = apply_resource(resource, &ctx);
        progress.on_resource_complete(resource.address(), &applied.result);
        execution.record(resource, applied);
    }

    progress.on_batch_complete();
    Ok(execution)
}

/// Apply a single resource, unless the run was cancelled before it started
fn apply_resource(resource: &dyn Resource, ctx: &ApplyContext) -> Applied {
    if ctx.cancel.is_cancelled() {
        log::debug!("{}: cancelled before apply", resource.address());
        return Applied::skipped(CANCELLED);
    }
    match resource.apply(ctx) {
        Ok(applied) => applied,
        Err(e) => Applied::new(
            ApplyResult::Failed {
                error: format!("{e:#}"),
            },
            SnapshotUpdate::Keep,
        ),
    }
}

/// Simple execution without callbacks
pub fn execute_simple(plan: ExecutionPlan, opts: ExecuteOptions) -> Result<Execution> {
    execute(plan, opts, &CancelToken::new(), &mut NoProgress, &mut AutoConfirm)
}
