//! Error types for command execution.
//!
//! Errors are categorized so the retry layer can tell a transient failure
//! (network hiccup, package manager lock held by unattended-upgrades) from a
//! permanent one (bad package name, permission denied). Only transient
//! categories are ever retried, and only for commands that opted in.

use std::time::Duration;
use thiserror::Error;

use crate::types::CommandOutput;

/// Categories of command failures for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// The command ran longer than its timeout (transient, retryable)
    Timeout,
    /// dpkg/apt lock is held by another process (transient, retryable)
    Locked,
    /// Package, user, or file not found
    NotFound,
    /// Permission denied
    Permission,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Locked)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Timeout => "Command timed out",
            Self::Locked => "Package manager is busy",
            Self::NotFound => "Not found",
            Self::Permission => "Permission denied",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while running commands or fetching URLs.
#[derive(Debug, Error)]
pub enum Error {
    /// The program could not be started at all
    #[error("failed to execute {command}: {source}")]
    Spawn {
        /// Display form of the command
        command: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The command exceeded its timeout and was killed
    #[error("{command} timed out after {after:?}")]
    Timeout {
        /// Display form of the command
        command: String,
        /// Configured timeout
        after: Duration,
    },

    /// Network-related error (DNS, connection refused, TLS, HTTP 5xx)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message
        message: String,
    },

    /// dpkg frontend lock held by another process
    #[error("package manager is locked: {message}")]
    Locked {
        /// Detailed error message
        message: String,
    },

    /// Something the command needed does not exist
    #[error("not found: {message}")]
    NotFound {
        /// Detailed error message
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Detailed error message
        message: String,
    },

    /// Command exited non-zero for a reason we could not categorize
    #[error("{command} exited with status {code}: {stderr}")]
    CommandFailed {
        /// Display form of the command
        command: String,
        /// Exit code (-1 when killed by a signal)
        code: i32,
        /// Trimmed standard error
        stderr: String,
    },

    /// HTTP request returned a non-success status
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// Requested URL
        url: String,
        /// Status code
        status: u16,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Locked { .. } => ErrorCategory::Locked,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::Http { status, .. } if *status >= 500 || *status == 429 => {
                ErrorCategory::Network
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from a failed command's output.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_output(command: &str, output: &CommandOutput) -> Self {
        let stderr = output.stderr.trim();
        let stderr_lower = stderr.to_lowercase();

        if stderr_lower.contains("could not get lock")
            || stderr_lower.contains("unable to acquire the dpkg frontend lock")
            || stderr_lower.contains("is another process using it")
        {
            return Error::Locked {
                message: stderr.to_string(),
            };
        }

        if stderr_lower.contains("could not resolve")
            || stderr_lower.contains("temporary failure resolving")
            || stderr_lower.contains("temporary failure in name resolution")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("connection timed out")
            || stderr_lower.contains("network is unreachable")
            || stderr_lower.contains("failed to fetch")
            || stderr_lower.contains("curl: (")
        {
            return Error::Network {
                message: stderr.to_string(),
            };
        }

        if stderr_lower.contains("unable to locate package")
            || stderr_lower.contains("no such file or directory")
            || stderr_lower.contains("no such user")
            || stderr_lower.contains("command not found")
        {
            return Error::NotFound {
                message: stderr.to_string(),
            };
        }

        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("operation not permitted")
            || stderr_lower.contains("are you root")
        {
            return Error::Permission {
                message: stderr.to_string(),
            };
        }

        Error::CommandFailed {
            command: command.to_string(),
            code: output.exit_code,
            stderr: stderr.to_string(),
        }
    }

    /// Convert a ureq error into a categorized error.
    pub fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => Error::Http {
                url: url.to_string(),
                status,
            },
            other => Error::Network {
                message: format!("{url}: {other}"),
            },
        }
    }
}

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Error>;
