//! Lifecycle orchestrator
//!
//! Drives one remote entity through create, read, update and delete. Every
//! operation on a single identity is sequential; the orchestrator holds no
//! state of its own beyond borrowed configuration, so independent
//! identities can be reconciled from different threads.

use crate::access::AccessLevelRegistry;
use crate::adapter::{AdapterError, DeleteMode, RemoteAdapter, UpdateStyle};
use crate::diff::{self, FieldDiff};
use crate::error::{Error, Operation, Result};
use crate::field::carry_write_only;
use crate::identity::Identity;
use crate::poller::{CancelToken, PollConfig, PollOutcome, confirm_deleted};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a managed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not created yet
    Absent,
    /// Create call in flight
    Creating,
    /// Exists and the observed snapshot is current
    Present,
    /// Delete issued, waiting for confirmation
    Deleting,
    /// Confirmed removed
    Gone,
    /// A remote operation failed
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Deleting => "deleting",
            Self::Gone => "gone",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One managed remote entity
#[derive(Debug, Clone, PartialEq)]
pub struct Instance<S> {
    pub identity: Option<Identity>,
    pub phase: Phase,
    pub observed: Option<S>,
    pub warnings: Vec<String>,
}

impl<S> Instance<S> {
    /// An instance that has not been created.
    pub fn absent() -> Self {
        Self {
            identity: None,
            phase: Phase::Absent,
            observed: None,
            warnings: Vec::new(),
        }
    }

    /// An existing instance with a known snapshot.
    pub fn present(identity: Identity, observed: S) -> Self {
        Self {
            identity: Some(identity),
            phase: Phase::Present,
            observed: Some(observed),
            warnings: Vec::new(),
        }
    }

    /// An existing instance known only by identity (e.g. after import).
    pub fn tracked(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            phase: Phase::Present,
            observed: None,
            warnings: Vec::new(),
        }
    }
}

/// Result of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Present,
    /// Removed out of band
    Gone,
}

/// Result of an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing differed; no remote call was made
    Unchanged,
    Updated { fields: Vec<&'static str> },
}

/// Drives instances of one resource type through their lifecycle
pub struct Orchestrator<'a, A: RemoteAdapter> {
    adapter: &'a A,
    registry: &'a AccessLevelRegistry,
    poll: PollConfig,
}

impl<'a, A: RemoteAdapter> Orchestrator<'a, A> {
    pub fn new(adapter: &'a A, registry: &'a AccessLevelRegistry) -> Self {
        Self {
            adapter,
            registry,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Validate a desired state without touching the remote.
    pub fn validate(&self, desired: &A::State) -> Result<()> {
        self.adapter.validate(desired, self.registry)
    }

    /// Create the entity and populate the snapshot with a fresh read.
    ///
    /// The create response is not trusted as the observed state: the remote
    /// may fill defaults the echo omits.
    pub fn create(&self, instance: &mut Instance<A::State>, desired: &A::State) -> Result<()> {
        if !matches!(instance.phase, Phase::Absent | Phase::Gone) {
            return Err(self.transition(Operation::Create, instance.phase));
        }
        self.validate(desired)?;

        instance.phase = Phase::Creating;
        instance.warnings.clear();
        let created = match self.adapter.create(desired) {
            Ok(created) => created,
            Err(e) => {
                instance.phase = Phase::Failed;
                return Err(self.remote(Operation::Create, "(new)", e));
            }
        };
        log::info!("created {} {}", self.adapter.kind(), created.identity);
        instance.identity = Some(created.identity.clone());

        match self.adapter.read(&created.identity) {
            Ok(observed) => {
                let mut state = observed.state;
                carry_write_only(&mut state, desired, self.adapter.fields());
                let filled = created
                    .echo
                    .as_ref()
                    .is_some_and(|echo| diff::drifted(echo, &state, self.adapter.fields()));
                if filled {
                    log::debug!(
                        "{} {}: remote filled in values the create response omitted",
                        self.adapter.kind(),
                        created.identity
                    );
                }
                self.record_warnings(instance, &created.identity, observed.warnings);
                instance.observed = Some(state);
                instance.phase = Phase::Present;
                Ok(())
            }
            Err(e) => {
                instance.phase = Phase::Failed;
                Err(self.remote(Operation::Read, created.identity.as_str(), e))
            }
        }
    }

    /// Refresh the observed snapshot.
    pub fn read(&self, instance: &mut Instance<A::State>) -> Result<ReadOutcome> {
        let identity = self.identity_of(instance, Operation::Read)?;
        match self.adapter.read(&identity) {
            Ok(observed) => {
                let mut state = observed.state;
                if let Some(previous) = &instance.observed {
                    carry_write_only(&mut state, previous, self.adapter.fields());
                }
                instance.warnings.clear();
                self.record_warnings(instance, &identity, observed.warnings);
                instance.observed = Some(state);
                instance.phase = Phase::Present;
                Ok(ReadOutcome::Present)
            }
            Err(AdapterError::NotFound) => {
                log::info!("{} {identity} no longer exists", self.adapter.kind());
                instance.observed = None;
                instance.phase = Phase::Gone;
                Ok(ReadOutcome::Gone)
            }
            Err(e) => {
                instance.phase = Phase::Failed;
                Err(self.remote(Operation::Read, identity.as_str(), e))
            }
        }
    }

    /// Fields that cannot reach `desired` without destroy + recreate.
    pub fn replacement_fields(
        &self,
        instance: &Instance<A::State>,
        desired: &A::State,
    ) -> Vec<&'static str> {
        instance
            .observed
            .as_ref()
            .map(|observed| diff::replacement_fields(observed, desired, self.adapter.fields()))
            .unwrap_or_default()
    }

    /// The minimal update payload for `desired`.
    pub fn pending_changes(&self, instance: &Instance<A::State>, desired: &A::State) -> FieldDiff {
        instance
            .observed
            .as_ref()
            .map(|observed| diff::diff(observed, desired, self.adapter.fields()))
            .unwrap_or_default()
    }

    /// Converge an existing entity toward `desired` in place.
    pub fn update(
        &self,
        instance: &mut Instance<A::State>,
        desired: &A::State,
    ) -> Result<UpdateOutcome> {
        let identity = self.identity_of(instance, Operation::Update)?;
        if instance.phase != Phase::Present {
            return Err(self.transition(Operation::Update, instance.phase));
        }
        self.validate(desired)?;

        if instance.observed.is_none() && self.read(instance)? == ReadOutcome::Gone {
            return Err(self.transition(Operation::Update, Phase::Gone));
        }

        let replace = self.replacement_fields(instance, desired);
        if !replace.is_empty() {
            return Err(Error::RequiresReplacement {
                kind: self.adapter.kind(),
                identity: identity.to_string(),
                fields: replace,
            });
        }

        let changes = self.pending_changes(instance, desired);
        if changes.is_empty() {
            log::debug!("{} {identity} is up to date", self.adapter.kind());
            return Ok(UpdateOutcome::Unchanged);
        }

        let payload = match self.adapter.update_style() {
            UpdateStyle::Patch => changes.clone(),
            UpdateStyle::Replace => diff::full_payload(desired, self.adapter.fields()),
        };

        match self.adapter.update(&identity, &payload) {
            Ok(observed) => {
                let mut state = observed.state;
                carry_write_only(&mut state, desired, self.adapter.fields());
                if let Some(previous) = &instance.observed {
                    carry_write_only(&mut state, previous, self.adapter.fields());
                }
                instance.warnings.clear();
                self.record_warnings(instance, &identity, observed.warnings);
                instance.observed = Some(state);
                log::info!("updated {} {identity}: {changes}", self.adapter.kind());
                Ok(UpdateOutcome::Updated {
                    fields: changes.fields(),
                })
            }
            Err(e) => {
                instance.phase = Phase::Failed;
                Err(self.remote(Operation::Update, identity.as_str(), e))
            }
        }
    }

    /// Delete the entity and wait until the remote confirms it is gone.
    pub fn delete(&self, instance: &mut Instance<A::State>, cancel: &CancelToken) -> Result<()> {
        let identity = self.identity_of(instance, Operation::Delete)?;
        if instance.phase == Phase::Gone {
            return Ok(());
        }

        instance.phase = Phase::Deleting;
        let issued = match self.adapter.delete_mode() {
            DeleteMode::Remove => self.adapter.delete(&identity),
            DeleteMode::Disable { field, value } => {
                log::warn!(
                    "{} {identity} cannot be removed remotely, setting {field} = {value}",
                    self.adapter.kind()
                );
                self.adapter
                    .update(&identity, &FieldDiff::single(field, value))
                    .map(|_| ())
            }
        };

        match issued {
            Ok(()) => self.await_deletion(instance, cancel),
            Err(AdapterError::NotFound) => {
                log::debug!("{} {identity} was already gone", self.adapter.kind());
                self.mark_gone(instance);
                Ok(())
            }
            Err(e) => {
                instance.phase = Phase::Failed;
                Err(self.remote(Operation::Delete, identity.as_str(), e))
            }
        }
    }

    /// Poll until a pending deletion is confirmed.
    ///
    /// Safe to call again after a timeout or cancellation; no mutation is
    /// re-issued.
    pub fn await_deletion(
        &self,
        instance: &mut Instance<A::State>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let identity = self.identity_of(instance, Operation::Delete)?;
        if instance.phase != Phase::Deleting {
            return Err(self.transition(Operation::Delete, instance.phase));
        }

        let outcome =
            confirm_deleted(&identity, || self.adapter.exists(&identity), &self.poll, cancel);
        match outcome {
            PollOutcome::Confirmed { attempts } => {
                log::info!(
                    "deleted {} {identity} (confirmed after {attempts} checks)",
                    self.adapter.kind()
                );
                self.mark_gone(instance);
                Ok(())
            }
            PollOutcome::TimedOut { elapsed, .. } => Err(Error::TimedOut {
                kind: self.adapter.kind(),
                identity: identity.to_string(),
                elapsed,
            }),
            PollOutcome::Cancelled => Err(Error::Cancelled {
                kind: self.adapter.kind(),
                identity: identity.to_string(),
            }),
            PollOutcome::Failed(e) => {
                instance.phase = Phase::Failed;
                Err(self.remote(Operation::Delete, identity.as_str(), e))
            }
        }
    }

    fn mark_gone(&self, instance: &mut Instance<A::State>) {
        instance.observed = None;
        instance.phase = Phase::Gone;
    }

    fn record_warnings(
        &self,
        instance: &mut Instance<A::State>,
        identity: &Identity,
        warnings: Vec<String>,
    ) {
        for warning in warnings {
            log::warn!("{} {identity}: {warning}", self.adapter.kind());
            instance.warnings.push(warning);
        }
    }

    fn identity_of(&self, instance: &Instance<A::State>, operation: Operation) -> Result<Identity> {
        let identity = instance
            .identity
            .clone()
            .ok_or_else(|| self.transition(operation, instance.phase))?;
        self.adapter.check_identity(&identity)?;
        Ok(identity)
    }

    fn transition(&self, operation: Operation, phase: Phase) -> Error {
        Error::InvalidTransition {
            kind: self.adapter.kind(),
            operation,
            phase,
        }
    }

    fn remote(&self, operation: Operation, identity: &str, source: AdapterError) -> Error {
        Error::Remote {
            kind: self.adapter.kind(),
            operation,
            identity: identity.to_string(),
            source,
        }
    }
}
