//! In-memory resources and runners for engine tests

use cmdkit::{CommandOutput, CommandSpec, RetryConfig, Runner};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::types::ResourceState;

/// Runner that succeeds without doing anything
pub struct NullRunner;

impl Runner for NullRunner {
    fn run(&self, _spec: &CommandSpec) -> cmdkit::Result<CommandOutput> {
        Ok(CommandOutput::ok(""))
    }

    fn fetch(&self, _url: &str, _retry: &RetryConfig) -> cmdkit::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Shared record of successful applies, in order
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// A boolean piece of state that apply flips to present
#[derive(Debug, Clone)]
pub struct Flag {
    name: String,
    present: Rc<Cell<bool>>,
    applies: Rc<Cell<usize>>,
    journal: Option<Journal>,
    effective: bool,
    failure: Option<String>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Flag {
    pub fn new(name: &str, present: bool) -> Self {
        Self {
            name: name.to_string(),
            present: Rc::new(Cell::new(present)),
            applies: Rc::new(Cell::new(0)),
            journal: None,
            effective: true,
            failure: None,
            interrupt: None,
        }
    }

    pub fn journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    /// Apply succeeds but changes nothing
    pub fn ineffective(mut self) -> Self {
        self.effective = false;
        self
    }

    pub fn failing(self) -> Self {
        self.failing_with("simulated failure")
    }

    pub fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Raise the interrupt flag while applying
    pub fn interrupting(mut self, flag: &Arc<AtomicBool>) -> Self {
        self.interrupt = Some(Arc::clone(flag));
        self
    }

    pub fn applies(&self) -> usize {
        self.applies.get()
    }
}

impl Resource for Flag {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Set {}", self.name)
    }

    fn resource_type(&self) -> &'static str {
        "flag"
    }

    fn probe(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(if self.present.get() {
            ResourceState::present()
        } else {
            ResourceState::Absent
        })
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<()> {
        if let Some(flag) = &self.interrupt {
            flag.store(true, Ordering::SeqCst);
        }
        if let Some(message) = &self.failure {
            return Err(Error::system(message.clone()));
        }
        self.applies.set(self.applies.get() + 1);
        if self.effective {
            self.present.set(true);
        }
        if let Some(journal) = &self.journal {
            journal.0.borrow_mut().push(self.name.clone());
        }
        Ok(())
    }
}
