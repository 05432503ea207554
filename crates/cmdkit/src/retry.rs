//! Bounded retry of transient failures.
//!
//! Only errors whose category is transient (network, timeout, dpkg lock)
//! are retried; anything else is returned from the attempt that hit it.

use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::RetryConfig;

/// A failed attempt that is about to be repeated.
#[derive(Debug)]
pub struct Retrying<'a> {
    /// 1-based number of the attempt that failed
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a Error,
    /// Pause before the next attempt
    pub delay: Duration,
}

/// Run `op` until it succeeds, fails permanently, or `policy` runs out of
/// attempts. `notify` sees every failure that will be retried, never the
/// final one.
pub fn with_retry<T>(
    policy: &RetryConfig,
    mut notify: impl FnMut(&Retrying<'_>),
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 1;
    loop {
        let error = match op() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !error.is_retryable() || attempt >= policy.max_attempts {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        notify(&Retrying {
            attempt,
            max_attempts: policy.max_attempts,
            error: &error,
            delay,
        });
        thread::sleep(delay);
        attempt += 1;
    }
}

/// Report a pending retry as a warning.
pub fn log_retry(retry: &Retrying<'_>) {
    log::warn!(
        "attempt {}/{} failed ({}); trying again in {:?}",
        retry.attempt,
        retry.max_attempts,
        retry.error,
        retry.delay
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(4),
        }
    }

    fn dpkg_locked() -> Error {
        Error::Locked {
            message: "Could not get lock /var/lib/dpkg/lock-frontend".to_string(),
        }
    }

    #[test]
    fn test_first_success_is_returned() {
        let mut calls = 0;
        let value = with_retry(&quick(3), |_| {}, || {
            calls += 1;
            Ok::<_, Error>("ok")
        })
        .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_permanent_error_stops_immediately() {
        let mut calls = 0;
        let err = with_retry(&quick(5), |_| {}, || -> Result<()> {
            calls += 1;
            Err(Error::NotFound {
                message: "E: Unable to locate package nodejs".to_string(),
            })
        })
        .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_lock_clears_on_third_attempt() {
        let mut calls = 0;
        let value = with_retry(&quick(3), |_| {}, || {
            calls += 1;
            if calls < 3 { Err(dpkg_locked()) } else { Ok(calls) }
        })
        .unwrap();

        assert_eq!(value, 3);
    }

    #[test]
    fn test_last_error_surfaces_and_is_not_announced() {
        let mut announced = Vec::new();
        let err = with_retry(
            &quick(3),
            |retry| announced.push((retry.attempt, retry.delay)),
            || -> Result<()> { Err(dpkg_locked()) },
        )
        .unwrap_err();

        assert!(matches!(err, Error::Locked { .. }));
        let attempts: Vec<u32> = announced.iter().map(|(n, _)| *n).collect();
        assert_eq!(attempts, vec![1, 2]);
        assert!(announced[0].1 < announced[1].1, "backoff grows");
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let mut calls = 0;
        let _ = with_retry(&quick(0), |_| {}, || -> Result<()> {
            calls += 1;
            Err(dpkg_locked())
        });
        assert_eq!(calls, 1);
    }
}
