//! # Reconcile
//!
//! Declarative reconciliation of entities owned by a remote API.
//!
//! The caller declares the desired state of an entity; the engine reads the
//! live state, computes the minimal set of changes, and drives the entity
//! through create, read, update and delete until the two agree.
//!
//! ## Core Concepts
//!
//! - **Identity**: opaque token for one remote entity; composite
//!   sub-resources join parent and child keys with `:`
//! - **AccessLevelRegistry**: bidirectional name <-> code table for permissions
//! - **Field / FieldDiff**: per-type field tables and the minimal update payload
//! - **RemoteAdapter**: per-type CRUD contract implemented against the remote
//! - **Orchestrator**: drives an [`Instance`] through its [`Phase`]s
//! - **confirm_deleted**: bounded, cancellable polling for async deletions
//!
//! On top of the lifecycle sits a type-erased layer: [`Managed`] binds an
//! adapter to one desired state and prior snapshot, [`ExecutionPlan`] groups
//! them, and [`execute`] applies the plan in parallel.
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{AccessLevelRegistry, Instance, Orchestrator, CancelToken};
//!
//! let registry = AccessLevelRegistry::gitlab();
//! let orch = Orchestrator::new(&adapter, &registry);
//!
//! let mut instance = Instance::absent();
//! orch.create(&mut instance, &desired)?;
//! orch.update(&mut instance, &changed)?;
//! orch.delete(&mut instance, &CancelToken::new())?;
//! ```

pub mod access;
pub mod adapter;
pub mod changes;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod field;
pub mod identity;
pub mod lifecycle;
pub mod planner;
pub mod poller;
pub mod resource;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use access::{AccessLevel, AccessLevelRegistry};
pub use adapter::{AdapterError, Created, DeleteMode, Observed, RemoteAdapter, UpdateStyle};
pub use changes::{ChangeSummary, ResourceChange, compute_changes, group_by_kind};
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
};
pub use diff::{FieldDiff, diff, replacement_fields};
pub use error::{Error, ErrorCategory, Operation, Result};
pub use executor::{CANCELLED, Execution, Outcome, execute, execute_simple};
pub use field::{Field, FieldValue, Mutability};
pub use identity::{Identity, decode, decode_pair, encode, encode_pair};
pub use lifecycle::{Instance, Orchestrator, Phase, ReadOutcome, UpdateOutcome};
pub use planner::ExecutionPlan;
pub use poller::{CancelToken, PollConfig, PollOutcome, PollState, confirm_deleted};
pub use resource::{BoxedResource, Managed, Resource};
pub use types::{
    Applied, ApplyResult, Change, ExecuteOptions, ExecuteSummary, Snapshot, SnapshotUpdate,
};
