//! Execution planner - builds engine plans from the manifest and state file

use anyhow::Result;
use reconcile::ExecutionPlan;

use crate::kinds::ResourceFactory;
use crate::manifest::Manifest;
use crate::state::StateFile;

/// Every declared resource, plus tracked resources that are no longer declared
/// (those plan as deletions).
pub fn desired_plan(
    manifest: &Manifest,
    state: &StateFile,
    factory: &ResourceFactory,
    target: Option<&str>,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();
    for entry in manifest.entries() {
        let address = entry.address();
        let prior = state.snapshot(&address);
        plan.add_resource(factory.build(&address, Some(&entry.attributes), prior)?);
    }
    for address in state.addresses().filter(|a| !manifest.contains(a)) {
        log::debug!("{address} is tracked but no longer declared");
        plan.add_resource(factory.build(address, None, state.snapshot(address))?);
    }
    Ok(plan.filter_by_target(target))
}

/// Every tracked resource with nothing declared: plans as deletions, and
/// refreshes without validating the manifest.
pub fn tracked_plan(
    state: &StateFile,
    factory: &ResourceFactory,
    target: Option<&str>,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();
    for address in state.addresses() {
        plan.add_resource(factory.build(address, None, state.snapshot(address))?);
    }
    Ok(plan.filter_by_target(target))
}
