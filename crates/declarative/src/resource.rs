//! Resource trait for idempotent provisioning
//!
//! A Resource is one piece of host state (a package, a config line, a
//! firewall rule) with a non-mutating probe and a mutating apply.

use crate::context::ApplyContext;
use crate::error::Result;
use crate::types::ResourceState;
use std::fmt;

/// Core trait for provisioned resources
///
/// # Contract
///
/// - `probe` is a pure read. Absence is a normal answer, not an error;
///   return `Err` only when the state cannot be read at all.
/// - `apply` performs the mutation. It is only called after a probe showed
///   the desired state does not hold, and may assume nothing else.
/// - `verify` re-reads the state after apply. It defaults to `probe`.
///
/// # Example
///
/// ```ignore
/// use declarative::{ApplyContext, Resource, ResourceState, Result};
///
/// #[derive(Debug)]
/// struct Marker { path: String }
///
/// impl Resource for Marker {
///     fn id(&self) -> String { self.path.clone() }
///     fn description(&self) -> String { format!("Create {}", self.path) }
///     fn resource_type(&self) -> &'static str { "marker" }
///
///     fn probe(&self, _ctx: &ApplyContext) -> Result<ResourceState> {
///         if std::path::Path::new(&self.path).exists() {
///             Ok(ResourceState::present())
///         } else {
///             Ok(ResourceState::Absent)
///         }
///     }
///
///     fn apply(&self, _ctx: &mut ApplyContext) -> Result<()> {
///         std::fs::write(&self.path, "")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Resource: fmt::Debug {
    /// Stable identifier of the target (e.g. "nginx", "/etc/ssh/sshd_config:Port")
    fn id(&self) -> String;

    /// Human-readable description of the mutation
    fn description(&self) -> String;

    /// Resource type category (e.g. "apt_package", "file_line", "ufw_rule")
    fn resource_type(&self) -> &'static str;

    /// Read the current state without changing anything
    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState>;

    /// The state this resource converges to
    fn desired_state(&self) -> ResourceState {
        ResourceState::present()
    }

    /// Whether `state` satisfies the desired state
    ///
    /// A desired `Present` without a value accepts any present value; one
    /// with a value requires an exact match.
    fn is_satisfied(&self, state: &ResourceState) -> bool {
        match (self.desired_state(), state) {
            (ResourceState::Present { value: None }, ResourceState::Present { .. }) => true,
            (desired @ ResourceState::Present { value: Some(_) }, current) => &desired == current,
            (ResourceState::Absent, ResourceState::Absent) => true,
            _ => false,
        }
    }

    /// Make the change
    fn apply(&self, ctx: &mut ApplyContext) -> Result<()>;

    /// Re-read the state after apply
    fn verify(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        self.probe(ctx)
    }

    /// Optional preview of the change (e.g. a unified diff) for plan output
    fn preview(&self, _ctx: &ApplyContext) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;
