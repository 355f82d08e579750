//! Execution engine for gitform
//!
//! The engine orchestrates:
//! 1. Planning - Build engine resources from the manifest and state file
//! 2. Diffing - Show what differs between GitLab and the manifest
//! 3. Executing - Apply changes in parallel and record snapshots

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{RunOptions, plan_changes, run};
pub use planner::{desired_plan, tracked_plan};
