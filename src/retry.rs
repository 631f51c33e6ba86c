//! Bounded exponential backoff for remote calls.
//!
//! HTTP 429 / 503 errors from vision APIs are frequent under concurrent load
//! and usually clear within a second or two. [`retry`] repeats an operation
//! while its error reports itself [`Transient`] and attempts remain, sleeping
//! `initial_delay × backoff_factor^(k-1)` before retry *k*. With jitter on,
//! each delay is scaled by a uniform factor in `[0.5, 1.0]` so that pages
//! failing together do not come back together.
//!
//! The wrapper knows nothing about what it retries: it takes any closure
//! returning a future of `Result<T, E>`. Errors are never swallowed here; once
//! attempts run out the last error is returned to the caller.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Implemented by errors that can tell whether repeating the call may help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 500 ms.
    pub initial_delay: Duration,
    /// Multiplier applied after each retry. Default: 2.0.
    pub backoff_factor: f64,
    /// Upper bound on any single delay, applied before jitter. Default: 30 s.
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.0]`. Default: true.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    /// Delay before retry number `retry`, with jitter applied when enabled.
    pub fn delay<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter {
            base.mul_f64(rng.gen_range(0.5..=1.0))
        } else {
            base
        }
    }
}

/// Run `op` under `policy`, returning its value or the last error.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_counted(policy, op).await.map(|(value, _)| value)
}

/// Like [`retry`], also reporting how many retries were spent on success.
pub async fn retry_counted<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<(T, u32), E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Succeeded on attempt {}/{}", attempt, max_attempts);
                }
                return Ok((value, attempt - 1));
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                // ThreadRng is not Send; keep it out of the await below.
                let delay = policy.delay(attempt, &mut rand::thread_rng());
                warn!(
                    "Attempt {}/{} failed ({}); retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("Giving up after {} attempts: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}
