//! Step graph - ordered execution with halt and dependency handling
//!
//! Actions run strictly in declaration order. Dependencies must name
//! earlier actions, so order is enforced when the graph is built rather
//! than solved at runtime.

use std::collections::HashMap;

use crate::action::Action;
use crate::context::{ApplyContext, ProgressCallback};
use crate::error::{Error, Result};
use crate::types::{RunSummary, SkipReason, StepResult};

/// Why a run stopped before the last action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// A fatal action failed
    Fatal { action: String },
    /// The operator interrupted the run
    Interrupted { before: String },
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One result per action, in declaration order
    pub results: Vec<StepResult>,
    /// Set when the run stopped early
    pub halt: Option<Halt>,
}

impl RunOutcome {
    /// Summary counts
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    /// Whether every action ended without a failure and the run finished
    pub fn is_success(&self) -> bool {
        self.halt.is_none() && self.summary().is_success()
    }

    /// Whether a fatal failure stopped the run
    pub fn halted_by_failure(&self) -> bool {
        matches!(self.halt, Some(Halt::Fatal { .. }))
    }

    /// Whether an interrupt stopped the run
    pub fn was_interrupted(&self) -> bool {
        matches!(self.halt, Some(Halt::Interrupted { .. }))
    }

    /// Last result for a named action
    pub fn result(&self, action: &str) -> Option<&StepResult> {
        self.results.iter().rev().find(|r| r.action == action)
    }
}

/// An ordered list of actions
#[derive(Debug, Default)]
pub struct StepGraph {
    actions: Vec<Action>,
}

impl StepGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action
    ///
    /// Fails if the name is taken or a dependency does not name an action
    /// already in the graph.
    pub fn push(&mut self, action: Action) -> Result<()> {
        if self.contains(action.name()) {
            return Err(Error::Graph {
                message: format!("duplicate action name '{}'", action.name()),
            });
        }

        if let Some(missing) = action.depends_on().iter().find(|dep| !self.contains(dep)) {
            return Err(Error::Graph {
                message: format!(
                    "action '{}' depends on '{}', which is not declared before it",
                    action.name(),
                    missing
                ),
            });
        }

        self.actions.push(action);
        Ok(())
    }

    /// Whether an action with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a.name() == name)
    }

    /// Actions in declaration order
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if the graph has no actions
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in order
    ///
    /// - A fatal failure stops the run; the rest are `NotAttempted`.
    /// - A soft failure is recorded and the run continues.
    /// - An action whose dependency did not succeed is skipped.
    /// - An interrupt is honoured between actions, never during one.
    pub fn run<P: ProgressCallback>(&self, ctx: &mut ApplyContext, progress: &mut P) -> RunOutcome {
        let mut results: Vec<StepResult> = Vec::with_capacity(self.actions.len());
        let mut status: HashMap<&str, bool> = HashMap::new();
        let mut halt: Option<Halt> = None;

        progress.on_run_start(self.actions.len());

        for (index, action) in self.actions.iter().enumerate() {
            let result = if let Some(halt) = &halt {
                let reason = match halt {
                    Halt::Fatal { .. } => SkipReason::NotAttempted,
                    Halt::Interrupted { .. } => SkipReason::Interrupted,
                };
                action.not_run(reason)
            } else if ctx.is_interrupted() {
                log::warn!("Interrupted before {}", action.name());
                halt = Some(Halt::Interrupted {
                    before: action.name().to_string(),
                });
                action.not_run(SkipReason::Interrupted)
            } else if let Some(dep) = action
                .depends_on()
                .iter()
                .find(|dep| !status.get(dep.as_str()).copied().unwrap_or(false))
            {
                log::info!("{}: skipped, dependency {} did not succeed", action.name(), dep);
                action.not_run(SkipReason::DependencyFailed {
                    dependency: dep.clone(),
                })
            } else {
                progress.on_step_start(index, action);
                let result = action.run(ctx);
                if result.is_fatal_failure() {
                    log::error!("{}: fatal failure, halting", action.name());
                    halt = Some(Halt::Fatal {
                        action: action.name().to_string(),
                    });
                }
                result
            };

            status.insert(action.name(), result.outcome.is_success());
            progress.on_step_complete(index, &result);
            results.push(result);
        }

        let outcome = RunOutcome { results, halt };
        progress.on_run_complete(&outcome.summary());
        outcome
    }
}
