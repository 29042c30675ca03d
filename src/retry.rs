//! Retry and backoff helpers
//!
//! Two shapes of retry live here:
//!
//! - [`retry_transient`] loops an async operation in place, giving up early on
//!   errors that retrying cannot fix. CRD installation at startup uses it.
//! - [`Backoff`] only computes delays. The reconciler hands those delays to
//!   the controller as requeue actions, so a failing claim never holds a
//!   worker while it waits.

use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tracing::{error, warn};

use crate::Error;

/// Bounded in-place retry for calls made before the controller starts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartupRetry {
    /// Attempts before giving up, including the first
    pub max_attempts: u32,
    /// Delays between attempts, jittered by 0.5x to 1.5x
    pub backoff: BackoffPolicy,
}

impl StartupRetry {
    /// Retry up to `max_attempts` times, starting at 500ms and capped at 30s
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
            },
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
///
/// Only errors for which [`Error::is_retryable`] holds are retried, so a
/// rejected manifest or missing RBAC fails on the first attempt.
pub async fn retry_transient<F, Fut, T>(
    retry: &StartupRetry,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !e.is_retryable() {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "operation failed permanently"
            );
            return Err(e);
        }
        if attempt >= retry.max_attempts {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "operation failed after max attempts"
            );
            return Err(e);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = retry.backoff.delay_for(attempt).mul_f64(jitter);
        warn!(
            operation = %operation_name,
            attempt,
            error = %e,
            delay_ms = delay.as_millis(),
            "operation failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Backoff policy for reconcile requeues
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given 1-based failure count: `initial * 2^(n-1)`, capped
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Per-key consecutive failure counter
///
/// Keys are claim `namespace/name` strings. Attempts are unbounded; a key's
/// count only goes back to zero on [`Backoff::reset`].
#[derive(Debug, Default)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: DashMap<String, u32>,
}

impl Backoff {
    /// Create a tracker with the given policy
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut entry = self.failures.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
        self.policy.delay_for(*entry)
    }

    /// Forget all failures for `key`
    pub fn reset(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Consecutive failures currently recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map(|v| *v).unwrap_or(0)
    }
}
