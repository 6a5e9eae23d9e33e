use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::time::Delay;

/// Fixed-interval retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` retries until the operation succeeds.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn forever(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn limited(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Runs `op` until it succeeds, sleeping `policy.interval` on `delay` between
/// attempts.
///
/// `op` receives the 1-based attempt number. Errors for which `should_retry`
/// returns `false` are returned immediately, as is the last error once the
/// policy is exhausted.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    delay: &dyn Delay,
    should_retry: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !should_retry(&err) || policy.exhausted(attempt) => return Err(err),
            Err(err) => {
                debug!(
                    attempt,
                    interval_ms = policy.interval.as_millis() as u64,
                    "attempt failed, retrying: {err}"
                );
                delay.sleep(policy.interval).await;
                attempt += 1;
            }
        }
    }
}
