//! # cmdkit
//!
//! Subprocess and HTTP primitives for host provisioning.
//!
//! Every interaction with the host goes through the [`Runner`] trait:
//!
//! - [`CommandSpec`] describes argv, optional stdin payload, timeout, the
//!   user to run as, and an optional [`RetryConfig`]
//! - [`CommandOutput`] captures exit code, stdout, and stderr
//! - [`SystemRunner`] spawns real processes, enforces the timeout, prefixes
//!   `sudo` when not root, and fetches URLs with `ureq`
//!
//! ## Retry policy
//!
//! Only commands that opt in with [`CommandSpec::retry`] (network fetches,
//! apt operations that can hit the dpkg lock) are retried, and only for
//! errors whose [`ErrorCategory`] is transient. A permanent failure is
//! surfaced on the first attempt.
//!
//! ```no_run
//! use cmdkit::{CommandSpec, Runner, SystemRunner};
//!
//! let runner = SystemRunner::new();
//! let output = runner.run(&CommandSpec::new("dpkg-query").args(["-W", "curl"]).unprivileged())?;
//! println!("installed: {}", output.success());
//! # Ok::<(), cmdkit::Error>(())
//! ```

pub mod error;
pub mod retry;
pub mod runner;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use retry::{Retrying, log_retry, with_retry};
pub use runner::{Runner, SystemRunner, is_root};
pub use types::{CommandOutput, CommandSpec, DEFAULT_TIMEOUT, RetryConfig};
