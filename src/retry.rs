use failsafe::backoff;
use std::future::Future;
use std::time::Duration;

/// Smallest delay the exponential backoff accepts.
pub const MIN_DELAY: Duration = Duration::from_secs(1);

/// Bounded exponential backoff shared by the LLM adapter and the record
/// store client.
///
/// `max_attempts` counts every call, including the first one: a policy with
/// `max_attempts = 3` calls the operation at most three times.
///
/// Backoff is computed in whole seconds: delays under one second are raised
/// to one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delays slept between consecutive attempts (`max_attempts - 1` of them).
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let attempts = self.max_attempts.max(1) as usize;
        let base = self.base_delay.max(MIN_DELAY);
        let max = self.max_delay.max(base);
        backoff::exponential(base, max).take(attempts - 1)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors for which `is_transient` returns true are retried; the
    /// last transient error is returned once the budget is spent.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_transient: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut delays = self.delays();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < attempts => {
                    let delay = delays.next().unwrap_or(MIN_DELAY);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        label,
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if is_transient(&e) {
                        tracing::error!("{} failed after {} attempts: {}", label, attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
