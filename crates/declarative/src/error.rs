//! Error taxonomy for provisioning runs
//!
//! Every error raised by a probe, apply, or verify is caught at the action
//! boundary and recorded as an [`ErrorKind`] inside the step's outcome.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::FailurePolicy;

/// Classification stored in a failed [`crate::Outcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad user input, caught before any mutation
    Validation,
    /// Network or lock failure that persisted through every retry
    Transient,
    /// Target is in an unexpected, non-idempotent state
    ResourceConflict,
    /// Mutation failed or did not verify; halts the run
    FatalSystem,
    /// Best-effort step failed; the run continues
    SoftSystem,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation error",
            Self::Transient => "transient error",
            Self::ResourceConflict => "resource conflict",
            Self::FatalSystem => "fatal system error",
            Self::SoftSystem => "soft system error",
        };
        f.write_str(name)
    }
}

/// Errors raised while building or running a step graph
#[derive(Debug, Error)]
pub enum Error {
    /// One or more parameters failed validation
    #[error("invalid input: {}", .problems.join("; "))]
    Validation {
        /// Every problem found, in schema order
        problems: Vec<String>,
    },

    /// Transient failure that survived the retry budget
    #[error("transient failure: {message}")]
    Transient { message: String },

    /// Target exists in a shape the action cannot converge from
    #[error("{resource}: {message}")]
    ResourceConflict { resource: String, message: String },

    /// Mutation or verification failed
    #[error("{message}")]
    System { message: String },

    /// Graph construction problem (duplicate name, unknown dependency)
    #[error("invalid step graph: {message}")]
    Graph { message: String },

    /// Command runner error
    #[error(transparent)]
    Command(#[from] cmdkit::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a system error
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Shorthand for a resource conflict
    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceConflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Classify this error for an action declared with `policy`
    pub fn kind(&self, policy: FailurePolicy) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::ResourceConflict { .. } => ErrorKind::ResourceConflict,
            Self::Command(e) if e.is_retryable() => ErrorKind::Transient,
            _ => match policy {
                FailurePolicy::Fatal => ErrorKind::FatalSystem,
                FailurePolicy::Soft => ErrorKind::SoftSystem,
            },
        }
    }
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
