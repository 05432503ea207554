//! Core types for declarative provisioning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorKind;

/// Observed or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResourceState {
    /// Resource does not exist/is not configured
    Absent,
    /// Resource exists; `value` carries a version or the current setting
    Present { value: Option<String> },
    /// State cannot be determined
    Unknown,
}

impl ResourceState {
    /// Present with no particular value
    pub fn present() -> Self {
        Self::Present { value: None }
    }

    /// Present with a version or setting
    pub fn present_with(value: impl Into<String>) -> Self {
        Self::Present {
            value: Some(value.into()),
        }
    }

    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The carried value, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Present { value } => value.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Present { value: None } => write!(f, "present"),
            Self::Present { value: Some(v) } => write!(f, "present ({v})"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// What a failure of an action means for the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Halt the graph; remaining actions are not attempted
    Fatal,
    /// Record the failure and continue with the next action
    Soft,
}

/// Why an action did not mutate anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Probe showed the desired state already holds
    AlreadySatisfied,
    /// An earlier fatal failure halted the run
    NotAttempted,
    /// The operator interrupted the run before this action
    Interrupted,
    /// A declared dependency did not succeed
    DependencyFailed { dependency: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySatisfied => write!(f, "already satisfied"),
            Self::NotAttempted => write!(f, "not attempted"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::DependencyFailed { dependency } => {
                write!(f, "dependency {dependency} did not succeed")
            }
        }
    }
}

/// Outcome of running one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing was changed
    Skipped { reason: SkipReason },
    /// The mutation ran and the postcondition was verified
    Applied,
    /// Probe, apply, or verify failed
    Failed { kind: ErrorKind, reason: String },
}

impl Outcome {
    /// Check if the action ended in the desired state
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Applied
                | Self::Skipped {
                    reason: SkipReason::AlreadySatisfied
                }
        )
    }

    /// Check if the action failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Check if the action never ran because of an earlier event
    pub fn is_not_attempted(&self) -> bool {
        matches!(
            self,
            Self::Skipped {
                reason: SkipReason::NotAttempted
                    | SkipReason::Interrupted
                    | SkipReason::DependencyFailed { .. }
            }
        )
    }
}

/// Audit record for one action; appended once, never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Action name
    pub action: String,
    /// Resource type of the action's target
    pub resource_type: String,
    /// What happened
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Policy the action was declared with
    pub policy: FailurePolicy,
    /// Verified value (version, discovered address) when present
    pub detail: Option<String>,
    /// When the action started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl StepResult {
    /// Whether this result halts the graph
    pub fn is_fatal_failure(&self) -> bool {
        self.outcome.is_failure() && self.policy == FailurePolicy::Fatal
    }
}

/// Summary counts over a run's results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subset of `skipped` that never ran (halt, interrupt, failed dependency)
    pub not_attempted: usize,
}

impl RunSummary {
    /// Build a summary from results
    pub fn from_results(results: &[StepResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &StepResult) {
        match &result.outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Skipped { .. } => {
                self.skipped += 1;
                if result.outcome.is_not_attempted() {
                    self.not_attempted += 1;
                }
            }
        }
    }

    /// Total number of actions
    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failed
    }

    /// Check if the run had no failures
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
