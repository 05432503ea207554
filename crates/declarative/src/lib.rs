//! # Declarative
//!
//! An idempotent provisioning engine: declare the host state you want,
//! probe what is there, and apply only the delta.
//!
//! ## Core Concepts
//!
//! - **Resource**: something with state on the host (package, config line,
//!   service, firewall rule) with a non-mutating probe and a mutating apply
//! - **Action**: a named resource with a failure policy (fatal or soft) and
//!   the names of earlier actions it depends on
//! - **StepGraph**: actions in declaration order; halts on fatal failure,
//!   continues past soft ones, honours interrupts between actions
//! - **StepResult**: the append-only audit record of one action
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Action, ApplyContext, NoProgress, StepGraph};
//!
//! let mut graph = StepGraph::new();
//! graph.push(Action::new("curl", AptPackage::new("curl")))?;
//! graph.push(Action::new("public-ip", PublicIp::new()).soft())?;
//!
//! let runner = cmdkit::SystemRunner::new();
//! let mut ctx = ApplyContext::new(&runner);
//! let outcome = graph.run(&mut ctx, &mut NoProgress);
//! assert!(outcome.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! - [`cmdkit::Runner`]: executes commands and fetches URLs
//! - [`ProgressCallback`]: receives progress updates
//! - [`Redact`]: scrubs secrets from failure reasons before they are recorded

pub mod action;
pub mod context;
pub mod diff;
pub mod error;
pub mod graph;
pub mod resource;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use action::Action;
pub use context::{ApplyContext, NoProgress, NoRedaction, ProgressCallback, Redact};
pub use diff::{DiffSummary, PendingChange, compute_changes};
pub use error::{Error, ErrorKind, Result};
pub use graph::{Halt, RunOutcome, StepGraph};
pub use resource::{BoxedResource, Resource};
pub use types::{FailurePolicy, Outcome, ResourceState, RunSummary, SkipReason, StepResult};
