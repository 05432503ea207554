//! Pending-change computation for plan (dry-run) output

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::context::ApplyContext;
use crate::graph::StepGraph;
use crate::types::{FailurePolicy, ResourceState};

/// A difference between current and desired state of one action's target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    /// Action name
    pub action: String,
    /// Type of the resource
    pub resource_type: String,
    /// Human-readable description
    pub description: String,
    /// Current state
    pub current: ResourceState,
    /// Desired state
    pub desired: ResourceState,
    /// Policy the action is declared with
    pub policy: FailurePolicy,
    /// Preview of the edit, when the resource can render one
    pub preview: Option<String>,
    /// Why the probe could not read the state
    pub probe_error: Option<String>,
}

impl PendingChange {
    /// Probe an action, returning None if nothing would change
    pub fn from_action(action: &Action, ctx: &ApplyContext) -> Option<Self> {
        let resource = action.resource();

        let (current, probe_error) = match resource.probe(ctx) {
            Ok(state) => (state, None),
            Err(err) => (ResourceState::Unknown, Some(err.to_string())),
        };

        if probe_error.is_none() && resource.is_satisfied(&current) {
            return None;
        }

        let preview = match resource.preview(ctx) {
            Ok(preview) => preview,
            Err(err) => {
                log::debug!("No preview for {}: {err}", action.name());
                None
            }
        };

        Some(Self {
            action: action.name().to_string(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            current,
            desired: resource.desired_state(),
            policy: action.policy(),
            preview,
            probe_error,
        })
    }

    /// Check if this change creates something
    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Absent, ResourceState::Present { .. })
        )
    }

    /// Check if this change alters an existing value
    pub fn is_modification(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Present { .. }, ResourceState::Present { .. })
        )
    }
}

/// Probe every action in a graph without applying anything
///
/// Each action is probed independently: a change that depends on an
/// earlier pending change may be reported against today's state.
pub fn compute_changes(graph: &StepGraph, ctx: &ApplyContext) -> Vec<PendingChange> {
    graph
        .actions()
        .iter()
        .filter_map(|action| PendingChange::from_action(action, ctx))
        .collect()
}

/// Change summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to change
    pub modifications: usize,
    /// Number of resources whose state could not be read
    pub unknown: usize,
}

impl DiffSummary {
    /// Create a summary from a list of changes
    pub fn from_changes(changes: &[PendingChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            if change.probe_error.is_some() || change.current == ResourceState::Unknown {
                summary.unknown += 1;
            } else if change.is_addition() {
                summary.additions += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.unknown
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
