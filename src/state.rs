use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{Identity, Snapshot, SnapshotUpdate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const STATE_VERSION: u32 = 1;

// ============================================================================
// State Structures
// ============================================================================

/// Everything gitform knows about the resources it manages
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateFile {
    pub version: u32,

    /// Tracked resources by address (`kind.name`)
    #[serde(default)]
    pub resources: BTreeMap<String, TrackedResource>,

    /// Last time the state was written
    pub last_updated: DateTime<Utc>,
}

/// One tracked resource
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrackedResource {
    pub kind: String,
    pub identity: Identity,

    /// Last observed state, including write-only values that were sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<serde_json::Value>,

    pub updated_at: DateTime<Utc>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// StateFile Implementation
// ============================================================================

impl StateFile {
    /// Load state from disk, or return an empty state if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, starting empty");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version > STATE_VERSION {
            anyhow::bail!(
                "State file {} has version {}, this gitform understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }

        log::debug!("Loaded {} tracked resources from {}", state.resources.len(), path.display());
        Ok(state)
    }

    /// Save state to disk, replacing the previous file in one rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content + "\n")
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    pub fn get(&self, address: &str) -> Option<&TrackedResource> {
        self.resources.get(address)
    }

    /// Snapshot handed to the engine as the prior state of `address`
    pub fn snapshot(&self, address: &str) -> Option<Snapshot> {
        self.resources.get(address).map(TrackedResource::snapshot)
    }

    /// Record what an operation did to `address`. Returns whether anything changed.
    pub fn record(&mut self, address: &str, update: SnapshotUpdate) -> bool {
        match update {
            SnapshotUpdate::Keep => false,
            SnapshotUpdate::Remove => self.resources.remove(address).is_some(),
            SnapshotUpdate::Set(snapshot) => {
                let unchanged = self.resources.get(address).is_some_and(|tracked| {
                    tracked.kind == snapshot.kind
                        && tracked.identity == snapshot.identity
                        && tracked.observed == snapshot.observed
                });
                if unchanged {
                    return false;
                }
                self.resources.insert(
                    address.to_string(),
                    TrackedResource {
                        kind: snapshot.kind,
                        identity: snapshot.identity,
                        observed: snapshot.observed,
                        updated_at: Utc::now(),
                    },
                );
                true
            }
        }
    }

    /// Tracked addresses in order
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

impl TrackedResource {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            kind: self.kind.clone(),
            identity: self.identity.clone(),
            observed: self.observed.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
