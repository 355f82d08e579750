//! Type-erased resources for planning and execution
//!
//! A [`Resource`] is one manifest entry (or one tracked state entry) bound to
//! its adapter. [`Managed`] implements it for any [`RemoteAdapter`], so the
//! planner and executor never see concrete state types.

use crate::access::AccessLevelRegistry;
use crate::adapter::RemoteAdapter;
use crate::context::ApplyContext;
use crate::error::Error;
use crate::lifecycle::{Instance, Orchestrator, Phase, UpdateOutcome};
use crate::poller::PollConfig;
use crate::types::{Applied, ApplyResult, Change, Snapshot, SnapshotUpdate};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Core trait for reconcilable resources
///
/// Planning is read-only: `plan` may hit the remote to refresh, but never
/// mutates it. Only `apply` mutates.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Unique address, `kind.name`
    fn address(&self) -> &str;

    /// Resource type, e.g. "group_variable"
    fn kind(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> String;

    /// Change needed to converge
    fn plan(&self) -> Change;

    /// Apply the planned change
    fn apply(&self, ctx: &ApplyContext) -> Result<Applied>;

    /// Read current remote state without changing anything
    fn refresh(&self) -> Result<SnapshotUpdate>;

    /// Whether this resource can be applied in parallel with others
    fn can_parallelize(&self) -> bool {
        true
    }
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// A resource driven by a remote adapter
///
/// `desired` is `None` for entries that are only tracked in state (they
/// will be deleted). `prior` is `None` for entries never created.
pub struct Managed<A: RemoteAdapter> {
    address: String,
    adapter: Arc<A>,
    registry: Arc<AccessLevelRegistry>,
    poll: PollConfig,
    desired: Option<A::State>,
    prior: Option<Snapshot>,
    refreshed: OnceLock<std::result::Result<Instance<A::State>, String>>,
}

impl<A: RemoteAdapter + 'static> Managed<A> {
    pub fn new(
        address: impl Into<String>,
        adapter: Arc<A>,
        registry: Arc<AccessLevelRegistry>,
    ) -> Self {
        Self {
            address: address.into(),
            adapter,
            registry,
            poll: PollConfig::default(),
            desired: None,
            prior: None,
            refreshed: OnceLock::new(),
        }
    }

    pub fn desired(mut self, desired: A::State) -> Self {
        self.desired = Some(desired);
        self
    }

    pub fn prior(mut self, prior: Option<Snapshot>) -> Self {
        self.prior = prior;
        self
    }

    pub fn poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn orchestrator(&self) -> Orchestrator<'_, A> {
        Orchestrator::new(self.adapter.as_ref(), self.registry.as_ref()).with_poll_config(self.poll)
    }

    /// Validate, restore the stored snapshot, and refresh it once.
    fn observe(&self) -> std::result::Result<&Instance<A::State>, &str> {
        self.refreshed
            .get_or_init(|| self.load().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(String::as_str)
    }

    fn load(&self) -> std::result::Result<Instance<A::State>, Error> {
        let orch = self.orchestrator();
        if let Some(desired) = &self.desired {
            orch.validate(desired)?;
        }

        let Some(prior) = &self.prior else {
            return Ok(Instance::absent());
        };
        let mut instance = match &prior.observed {
            Some(value) => {
                let state: A::State =
                    serde_json::from_value(value.clone()).map_err(|e| Error::Snapshot {
                        address: self.address.clone(),
                        message: e.to_string(),
                    })?;
                Instance::present(prior.identity.clone(), state)
            }
            None => Instance::tracked(prior.identity.clone()),
        };
        orch.read(&mut instance)?;
        Ok(instance)
    }

    fn snapshot_of(&self, instance: &Instance<A::State>) -> Result<SnapshotUpdate> {
        match (&instance.identity, instance.phase) {
            (_, Phase::Gone) => Ok(SnapshotUpdate::Remove),
            (Some(identity), _) => {
                let observed = instance
                    .observed
                    .as_ref()
                    .map(serde_json::to_value)
                    .transpose()
                    .with_context(|| format!("Failed to encode state of {}", self.address))?;
                Ok(SnapshotUpdate::Set(Snapshot {
                    kind: self.adapter.kind().to_string(),
                    identity: identity.clone(),
                    observed,
                }))
            }
            (None, _) => Ok(SnapshotUpdate::Keep),
        }
    }

    fn apply_change(
        &self,
        ctx: &ApplyContext,
        instance: &mut Instance<A::State>,
    ) -> Result<ApplyResult> {
        let orch = self.orchestrator();
        let change = self.plan();
        let result = match (&change, &self.desired) {
            (Change::NoOp, _) => ApplyResult::NoChange,
            (Change::Create, Some(desired)) => {
                if instance.phase == Phase::Gone {
                    instance.identity = None;
                }
                orch.create(instance, desired)?;
                ApplyResult::Created
            }
            (Change::Update { .. }, Some(desired)) => match orch.update(instance, desired)? {
                UpdateOutcome::Unchanged => ApplyResult::NoChange,
                UpdateOutcome::Updated { .. } => ApplyResult::Modified,
            },
            (Change::Replace { .. }, Some(desired)) => {
                orch.delete(instance, &ctx.cancel)?;
                instance.identity = None;
                orch.create(instance, desired)?;
                ApplyResult::Replaced
            }
            (Change::Delete, _) => {
                orch.delete(instance, &ctx.cancel)?;
                ApplyResult::Removed
            }
            (Change::Forget, _) => ApplyResult::Removed,
            (Change::Unknown { error }, _) => anyhow::bail!("{error}"),
            (_, None) => anyhow::bail!("{} has no desired state to apply", self.address),
        };
        Ok(result)
    }
}

impl<A: RemoteAdapter> fmt::Debug for Managed<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("address", &self.address)
            .field("kind", &self.adapter.kind())
            .field("declared", &self.desired.is_some())
            .field("tracked", &self.prior.is_some())
            .finish_non_exhaustive()
    }
}

impl<A: RemoteAdapter + 'static> Resource for Managed<A> {
    fn address(&self) -> &str {
        &self.address
    }

    fn kind(&self) -> &'static str {
        self.adapter.kind()
    }

    fn description(&self) -> String {
        match &self.desired {
            Some(desired) => self.adapter.describe(desired),
            None => match &self.prior {
                Some(prior) => format!("{} {}", self.adapter.kind(), prior.identity),
                None => self.address.clone(),
            },
        }
    }

    fn plan(&self) -> Change {
        let instance = match self.observe() {
            Ok(instance) => instance,
            Err(error) => {
                return Change::Unknown {
                    error: error.to_string(),
                };
            }
        };

        let Some(desired) = &self.desired else {
            return match instance.phase {
                Phase::Absent => Change::NoOp,
                Phase::Gone => Change::Forget,
                _ => Change::Delete,
            };
        };

        match instance.phase {
            Phase::Absent | Phase::Gone => Change::Create,
            _ => {
                let orch = self.orchestrator();
                let replace = orch.replacement_fields(instance, desired);
                if !replace.is_empty() {
                    return Change::Replace {
                        fields: replace.into_iter().map(String::from).collect(),
                    };
                }
                let changes = orch.pending_changes(instance, desired);
                if changes.is_empty() {
                    Change::NoOp
                } else {
                    Change::Update {
                        fields: changes.fields().into_iter().map(String::from).collect(),
                        detail: changes.to_string(),
                    }
                }
            }
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Applied> {
        if ctx.dry_run {
            return Ok(Applied::skipped("Dry run"));
        }

        let mut instance = match self.observe() {
            Ok(instance) => instance.clone(),
            Err(error) => anyhow::bail!("{error}"),
        };

        match self.apply_change(ctx, &mut instance) {
            Ok(result) => Ok(Applied::new(result, self.snapshot_of(&instance)?)),
            Err(e) => {
                // A half-finished replacement or a pending deletion still
                // changes what must be tracked.
                let snapshot = if instance.identity.is_none() && self.prior.is_some() {
                    SnapshotUpdate::Remove
                } else {
                    self.snapshot_of(&instance)?
                };
                let fatal = e
                    .downcast_ref::<Error>()
                    .is_none_or(|err| err.category().is_fatal());
                if fatal {
                    log::error!("{}: {e:#}", self.address);
                } else {
                    log::warn!("{}: {e:#}", self.address);
                }
                Ok(Applied::new(
                    ApplyResult::Failed {
                        error: format!("{e:#}"),
                    },
                    snapshot,
                ))
            }
        }
    }

    fn refresh(&self) -> Result<SnapshotUpdate> {
        match self.observe() {
            Ok(instance) => self.snapshot_of(instance),
            Err(error) => anyhow::bail!("{}: {error}", self.address),
        }
    }
}
