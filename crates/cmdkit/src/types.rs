//! Core types for command execution.

use std::fmt;
use std::time::Duration;

/// Default timeout for a single command invocation (10 minutes).
///
/// Package installs on a slow mirror routinely take several minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// A command to run on the host.
///
/// `stdin` is treated as sensitive: it is written to the child's standard
/// input and never logged or shown in [`CommandSpec::display`].
#[derive(Clone)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Optional payload written to stdin
    pub stdin: Option<Vec<u8>>,
    /// Run as this user instead of the invoking one (`sudo -u`)
    pub run_as: Option<String>,
    /// Whether the command needs root
    pub privileged: bool,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Kill the command after this long
    pub timeout: Duration,
    /// Retry policy for transient failures; `None` means a single attempt
    pub retry: Option<RetryConfig>,
}

impl CommandSpec {
    /// Create a privileged command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            run_as: None,
            privileged: true,
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed this payload to the command's stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run the command as another user.
    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    /// Mark the command as read-only; it never needs sudo.
    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Override the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry transient failures with this policy.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Human-readable form, safe to log (stdin is never included).
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.display())
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .field("run_as", &self.run_as)
            .field("privileged", &self.privileged)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, -1 when the process was killed by a signal
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with surrounding whitespace removed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Turn a non-zero exit into a categorized error.
    pub fn ensure_success(self, spec: &CommandSpec) -> crate::Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(crate::Error::from_output(&spec.display(), &self))
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_never_includes_stdin() {
        let spec = CommandSpec::new("psql")
            .args(["-v", "ON_ERROR_STOP=1"])
            .stdin("ALTER ROLE app PASSWORD 'hunter2';");

        assert_eq!(spec.display(), "psql -v ON_ERROR_STOP=1");
        assert!(!format!("{spec:?}").contains("hunter2"));
    }

    #[test]
    fn test_builder_defaults() {
        let spec = CommandSpec::new("dpkg-query").unprivileged();
        assert!(!spec.privileged);
        assert!(spec.retry.is_none());
        assert_eq!(spec.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_retry_config_delay() {
        let config = RetryConfig::new(5, Duration::from_secs(2), 2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_config_max_delay() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::new(5, Duration::from_secs(2), 2.0)
        };

        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_ensure_success_categorizes() {
        let spec = CommandSpec::new("apt-get").args(["install", "-y", "nope"]);
        let err = CommandOutput::failed(100, "E: Unable to locate package nope")
            .ensure_success(&spec)
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::NotFound);
    }
}
