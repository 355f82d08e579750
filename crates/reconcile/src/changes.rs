//! Planned changes across a set of resources

use crate::resource::Resource;
use crate::types::Change;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The planned change for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Address of the resource, `kind.name`
    pub address: String,
    /// Type of the resource
    pub kind: String,
    /// Human-readable description
    pub description: String,
    pub change: Change,
}

impl ResourceChange {
    /// Plan a resource, returning None if no changes are needed
    pub fn from_resource(resource: &dyn Resource) -> Option<Self> {
        let change = resource.plan();
        if change == Change::NoOp {
            return None;
        }
        Some(Self {
            address: resource.address().to_string(),
            kind: resource.kind().to_string(),
            description: resource.description(),
            change,
        })
    }
}

/// Plan every resource
///
/// Planning refreshes remote state, so it runs on the current rayon pool.
/// Only resources that need something are returned, in input order.
pub fn compute_changes(resources: &[Box<dyn Resource>]) -> Vec<ResourceChange> {
    resources
        .par_iter()
        .filter_map(|r| ResourceChange::from_resource(r.as_ref()))
        .collect()
}

/// Change summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub additions: usize,
    pub updates: usize,
    pub replacements: usize,
    pub removals: usize,
    /// Resources whose state could not be determined
    pub errors: usize,
}

impl ChangeSummary {
    /// Create a summary from a list of changes
    pub fn from_changes(changes: &[ResourceChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.change {
                Change::Create => summary.additions += 1,
                Change::Update { .. } => summary.updates += 1,
                Change::Replace { .. } => summary.replacements += 1,
                Change::Delete | Change::Forget => summary.removals += 1,
                Change::Unknown { .. } => summary.errors += 1,
                Change::NoOp => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.updates + self.replacements + self.removals
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group changes by resource kind
pub fn group_by_kind(changes: &[ResourceChange]) -> BTreeMap<&str, Vec<&ResourceChange>> {
    let mut groups: BTreeMap<&str, Vec<&ResourceChange>> = BTreeMap::new();
    for change in changes {
        groups.entry(change.kind.as_str()).or_default().push(change);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: &str, change: Change) -> ResourceChange {
        ResourceChange {
            address: format!("{kind}.x"),
            kind: kind.to_string(),
            description: String::new(),
            change,
        }
    }

    #[test]
    fn test_summary_from_changes() {
        let changes = vec![
            change("user", Change::Create),
            change("user", Change::Delete),
            change("deploy_key", Change::Replace { fields: vec![] }),
            change(
                "group_variable",
                Change::Unknown {
                    error: "boom".into(),
                },
            ),
        ];
        let summary = ChangeSummary::from_changes(&changes);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.removals, 1);
        assert_eq!(summary.replacements, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.total(), 3);
        assert!(summary.has_changes());

        let groups = group_by_kind(&changes);
        assert_eq!(groups["user"].len(), 2);
        assert_eq!(
            groups.keys().copied().collect::<Vec<_>>(),
            vec!["deploy_key", "group_variable", "user"]
        );
    }
}
