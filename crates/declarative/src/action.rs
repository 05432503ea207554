//! Actions: a named resource with a failure policy and dependencies

use chrono::Utc;
use std::time::Instant;

use crate::context::ApplyContext;
use crate::error::Error;
use crate::resource::{BoxedResource, Resource};
use crate::types::{FailurePolicy, Outcome, ResourceState, SkipReason, StepResult};

/// One idempotent step of a run
///
/// Immutable once built; all per-run state lives in [`ApplyContext`] and
/// the returned [`StepResult`].
#[derive(Debug)]
pub struct Action {
    name: String,
    resource: BoxedResource,
    policy: FailurePolicy,
    depends_on: Vec<String>,
}

impl Action {
    /// Create a fatal action with no dependencies
    pub fn new(name: impl Into<String>, resource: impl Resource + 'static) -> Self {
        Self {
            name: name.into(),
            resource: Box::new(resource),
            policy: FailurePolicy::Fatal,
            depends_on: Vec::new(),
        }
    }

    /// Record failures and keep going
    pub fn soft(mut self) -> Self {
        self.policy = FailurePolicy::Soft;
        self
    }

    /// Require these actions to have succeeded first
    pub fn after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    /// Probe, apply if needed, verify
    ///
    /// Never returns an error: every failure becomes a `Failed` outcome.
    pub fn run(&self, ctx: &mut ApplyContext) -> StepResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        let (outcome, detail) = match self.converge(ctx) {
            Ok((outcome, state)) => (outcome, state.value().map(|v| ctx.redact(v))),
            Err(err) => {
                log::debug!("{} failed: {err}", self.name);
                (
                    Outcome::Failed {
                        kind: err.kind(self.policy),
                        reason: ctx.redact(&err.to_string()),
                    },
                    None,
                )
            }
        };

        if outcome == Outcome::Applied {
            ctx.mark_applied(&self.name);
        }

        StepResult {
            action: self.name.clone(),
            resource_type: self.resource.resource_type().to_string(),
            outcome,
            policy: self.policy,
            detail,
            started_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// A result for an action that never ran
    pub fn not_run(&self, reason: SkipReason) -> StepResult {
        StepResult {
            action: self.name.clone(),
            resource_type: self.resource.resource_type().to_string(),
            outcome: Outcome::Skipped { reason },
            policy: self.policy,
            detail: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    fn converge(&self, ctx: &mut ApplyContext) -> crate::Result<(Outcome, ResourceState)> {
        let resource = self.resource.as_ref();

        let current = resource.probe(ctx)?;
        if resource.is_satisfied(&current) {
            log::debug!("{}: already {current}", self.name);
            return Ok((
                Outcome::Skipped {
                    reason: SkipReason::AlreadySatisfied,
                },
                current,
            ));
        }

        log::info!("{}: {} ({current})", self.name, resource.description());
        resource.apply(ctx)?;

        let verified = resource.verify(ctx)?;
        if !resource.is_satisfied(&verified) {
            return Err(Error::system(format!(
                "postcondition not met after apply: expected {}, found {verified}",
                resource.desired_state()
            )));
        }

        Ok((Outcome::Applied, verified))
    }
}
