//! The [`Runner`] trait and its subprocess-backed implementation.

use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::error::{Error, Result};
use crate::retry::{log_retry, with_retry};
use crate::types::{CommandOutput, CommandSpec, RetryConfig};

/// How long a timed-out command gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Upper bound for downloaded installer scripts and signing keys.
const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

/// Default timeout for HTTP fetches.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Low-level primitive for every interaction with the host.
///
/// `run` returns `Ok` for any command that started and finished, whatever
/// its exit code: a non-zero exit is information for probes. The exception
/// is a spec with a retry policy, where a transient failure that persists
/// through every attempt is escalated as an `Err`.
pub trait Runner {
    /// Run a command to completion and capture its output.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Fetch a URL over HTTPS, retrying transient failures.
    fn fetch(&self, url: &str, retry: &RetryConfig) -> Result<Vec<u8>>;
}

/// Runs commands as real subprocesses.
pub struct SystemRunner {
    use_sudo: bool,
    agent: ureq::Agent,
}

impl SystemRunner {
    /// Create a runner; privileged commands are prefixed with `sudo`
    /// unless the process already runs as root.
    pub fn new() -> Self {
        Self::with_fetch_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a runner with a custom HTTP timeout.
    pub fn with_fetch_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            use_sudo: !is_root(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// Force sudo prefixing on or off.
    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    fn build_command(&self, spec: &CommandSpec) -> Command {
        let mut argv: Vec<String> = Vec::new();

        if let Some(user) = &spec.run_as {
            argv.extend(["sudo", "-u", user.as_str(), "-H", "--"].map(String::from));
        } else if spec.privileged && self.use_sudo {
            argv.extend(["sudo", "--"].map(String::from));
        }

        if !spec.env.is_empty() {
            argv.push("env".to_string());
            argv.extend(spec.env.iter().map(|(k, v)| format!("{k}={v}")));
        }

        argv.push(spec.program.clone());
        argv.extend(spec.args.iter().cloned());

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        // Own group, so a timeout reaches sudo and whatever it started.
        command.process_group(0);

        // Ctrl-C at the terminal must not kill a half-applied mutation; the
        // parent decides between steps whether to stop.
        // SAFETY: signal(2) is async-signal-safe and the closure touches no
        // state shared with the parent.
        unsafe {
            command.pre_exec(|| {
                libc::signal(libc::SIGINT, libc::SIG_IGN);
                Ok(())
            });
        }

        command
    }

    fn run_once(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let display = spec.display();
        log::debug!("exec: {display}");

        let mut command = self.build_command(spec);
        command
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: display.clone(),
            source,
        })?;

        let writer = match (&spec.stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => {
                let input = input.clone();
                Some(thread::spawn(move || {
                    // The child may exit without reading everything.
                    let _ = pipe.write_all(&input);
                }))
            }
            _ => None,
        };
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match child.wait_timeout(spec.timeout)? {
            Some(status) => Some(status),
            None => {
                kill_group(&mut child)?;
                None
            }
        };

        if let Some(handle) = writer {
            let _ = handle.join();
        }
        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        let Some(status) = status else {
            log::warn!("{display} timed out after {:?}", spec.timeout);
            return Err(Error::Timeout {
                command: display,
                after: spec.timeout,
            });
        };

        let output = CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        };

        log::debug!("exit {} from {display}", output.exit_code);
        if spec.stdin.is_none() && !output.success() {
            log::trace!("stderr from {display}: {}", output.stderr.trim());
        }

        Ok(output)
    }

    fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {url}");

        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| Error::from_ureq(url, e))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| Error::from_ureq(url, e))
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let Some(retry) = &spec.retry else {
            return self.run_once(spec);
        };

        with_retry(retry, log_retry, || {
            let output = self.run_once(spec)?;
            if !output.success() {
                let err = Error::from_output(&spec.display(), &output);
                if err.is_retryable() {
                    return Err(err);
                }
            }
            Ok(output)
        })
    }

    fn fetch(&self, url: &str, retry: &RetryConfig) -> Result<Vec<u8>> {
        with_retry(retry, log_retry, || self.fetch_once(url))
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

/// Terminate the child's process group, escalating to SIGKILL for
/// anything still alive after the grace period.
fn kill_group(child: &mut Child) -> io::Result<()> {
    let pgid = child.id() as libc::pid_t;

    // SAFETY: killpg only sends a signal; ESRCH for an empty group is fine.
    unsafe { libc::killpg(pgid, libc::SIGTERM) };
    child.wait_timeout(KILL_GRACE)?;
    // SAFETY: as above.
    unsafe { libc::killpg(pgid, libc::SIGKILL) };
    child.wait()?;
    Ok(())
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Whether the current process runs with effective uid 0.
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;

    fn runner() -> SystemRunner {
        SystemRunner::new().with_sudo(false)
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_captures_stdout_and_exit_code() {
        let output = runner()
            .run(&CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout_trimmed(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_stdin_is_delivered() {
        let output = runner()
            .run(&CommandSpec::new("cat").stdin("line one\nline two\n"))
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "line one\nline two\n");
    }

    #[test]
    fn test_env_is_passed() {
        let output = runner()
            .run(
                &CommandSpec::new("sh")
                    .args(["-c", "echo $PROVISIO_TEST_VALUE"])
                    .env("PROVISIO_TEST_VALUE", "42"),
            )
            .unwrap();

        assert_eq!(output.stdout_trimmed(), "42");
    }

    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let err = runner()
            .run(&CommandSpec::new("sleep").arg("5").timeout(Duration::from_millis(100)))
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_kills_forked_grandchildren() {
        // sh forks sleep here instead of exec'ing it; the sleep keeps the
        // output pipes open after sh itself is gone.
        let started = Instant::now();
        let err = runner()
            .run(
                &CommandSpec::new("sh")
                    .args(["-c", "sleep 6; true"])
                    .timeout(Duration::from_millis(100)),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.to_string().ends_with("timed out after 100ms"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = runner()
            .run(&CommandSpec::new("definitely-not-a-real-program-4821"))
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_transient_failure_is_retried_then_escalated() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("attempts");
        let script = format!(
            "echo x >> {}; echo 'E: Could not get lock /var/lib/dpkg/lock-frontend' >&2; exit 100",
            counter.display()
        );

        let err = runner()
            .run(&CommandSpec::new("sh").args(["-c", &script]).retry(fast_retry()))
            .unwrap_err();

        assert!(matches!(err, Error::Locked { .. }));
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("attempts");
        let script = format!(
            "echo x >> {}; echo 'E: Unable to locate package nope' >&2; exit 100",
            counter.display()
        );

        let output = runner()
            .run(&CommandSpec::new("sh").args(["-c", &script]).retry(fast_retry()))
            .unwrap();

        assert_eq!(output.exit_code, 100);
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_commands_without_retry_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("attempts");
        let script = format!(
            "echo x >> {}; echo 'Temporary failure resolving archive.ubuntu.com' >&2; exit 100",
            counter.display()
        );

        let output = runner()
            .run(&CommandSpec::new("sh").args(["-c", &script]))
            .unwrap();

        assert!(!output.success());
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
    }
}
