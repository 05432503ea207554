//! Apply context and provider traits
//!
//! These traits keep the engine free of any particular terminal UI or
//! secret store; the binary supplies implementations.

use cmdkit::Runner;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::action::Action;
use crate::types::{RunSummary, StepResult};

/// Progress callback for graph execution
pub trait ProgressCallback {
    /// Called once before the first action
    fn on_run_start(&mut self, total: usize);

    /// Called when an action is about to probe
    fn on_step_start(&mut self, index: usize, action: &Action);

    /// Called with every result, including not-attempted ones
    fn on_step_complete(&mut self, index: usize, result: &StepResult);

    /// Called once after the last result
    fn on_run_complete(&mut self, summary: &RunSummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_step_start(&mut self, _index: usize, _action: &Action) {}
    fn on_step_complete(&mut self, _index: usize, _result: &StepResult) {}
    fn on_run_complete(&mut self, _summary: &RunSummary) {}
}

/// Scrubs sensitive values out of text before it enters the audit trail
pub trait Redact {
    /// Return `text` with every secret replaced
    fn redact(&self, text: &str) -> String;
}

/// Redactor for runs without secrets
pub struct NoRedaction;

impl Redact for NoRedaction {
    fn redact(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Context passed to probe, apply, and verify
pub struct ApplyContext<'a> {
    /// Command runner for every host interaction
    pub runner: &'a dyn Runner,
    redactor: &'a dyn Redact,
    interrupt: Option<&'a AtomicBool>,
    facts: BTreeMap<String, String>,
    applied: BTreeSet<String>,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self {
            runner,
            redactor: &NoRedaction,
            interrupt: None,
            facts: BTreeMap::new(),
            applied: BTreeSet::new(),
        }
    }

    /// Scrub failure reasons and details with this redactor
    pub fn with_redactor(mut self, redactor: &'a dyn Redact) -> Self {
        self.redactor = redactor;
        self
    }

    /// Stop between actions once this flag is set
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Whether the operator asked the run to stop
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Look up a fact discovered earlier in the run
    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }

    /// Record a fact for later actions and the report
    pub fn set_fact(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.facts.insert(key.into(), value.into());
    }

    /// Whether the named action mutated the host during this run
    pub fn was_applied(&self, action: &str) -> bool {
        self.applied.contains(action)
    }

    pub(crate) fn mark_applied(&mut self, action: &str) {
        self.applied.insert(action.to_string());
    }

    pub(crate) fn redact(&self, text: &str) -> String {
        self.redactor.redact(text)
    }
}
