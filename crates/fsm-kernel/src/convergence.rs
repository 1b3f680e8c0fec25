//! Bounded waits for asynchronous store-side processes
//!
//! The TTL monitor sleeps a fixed interval between passes no matter how short
//! the configured TTL is, so the budget is derived from
//! `max(monitor sleep, ttl)` and then stretched by an environment factor.

use crate::error::{ConvergenceTimeoutError, WorkloadError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Default sleep between TTL monitor passes, in seconds
pub const DEFAULT_TTL_MONITOR_SLEEP_SECS: u64 = 60;

/// Budget multiplier on CI-like hosts
pub const CI_TIMEOUT_MULTIPLIER: u64 = 10;

/// Budget multiplier everywhere else
pub const LOCAL_TIMEOUT_MULTIPLIER: u64 = 2;

/// Timeout multiplier: 10 in CI, 2 otherwise
#[inline]
#[must_use]
pub fn timeout_multiplier(ci_environment: bool) -> u64 {
    if ci_environment {
        CI_TIMEOUT_MULTIPLIER
    } else {
        LOCAL_TIMEOUT_MULTIPLIER
    }
}

/// `multiplier × max(monitor_sleep_secs, ttl_seconds) × 1000` milliseconds
#[must_use]
pub fn ttl_convergence_timeout(
    ttl_seconds: u64,
    monitor_sleep_secs: u64,
    ci_environment: bool,
) -> Duration {
    let secs = monitor_sleep_secs.max(ttl_seconds);
    Duration::from_millis(
        timeout_multiplier(ci_environment)
            .saturating_mul(secs)
            .saturating_mul(1000),
    )
}

/// Poll `check` every `interval` until it returns `true`.
///
/// A final check runs at the deadline, and the timeout error is raised only
/// once the full `timeout` has elapsed. Errors returned by `check` abort the
/// wait immediately.
pub async fn assert_soon<F, Fut, E>(
    mut check: F,
    message: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), WorkloadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Into<WorkloadError>,
{
    let interval = interval.max(Duration::from_millis(1));
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        if check().await.map_err(Into::into)? {
            let waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::debug!(attempts, waited_ms, "converged");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(attempts, timeout_ms, "{message}");
            return Err(ConvergenceTimeoutError {
                message: message.to_string(),
                timeout,
            }
            .into());
        }

        sleep(interval.min(deadline - now)).await;
    }
}
