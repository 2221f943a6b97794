use crate::Result;
use log::debug;
use std::{thread, time::Duration};

/// Caller side retry with exponential backoff.
///
/// The bus never retries on its own. Callers that want to ride out busy buses, timeouts
/// and failed searches wrap their calls in [`RetryPolicy::run`], which retries only
/// errors for which [`Error::is_retryable`](crate::Error::is_retryable) holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub attempts: u32,
    /// Wait before the second attempt.
    pub backoff: Duration,
    /// Factor applied to the wait after every failed attempt.
    pub factor: u32,
    /// Upper bound of the wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
            factor: 2,
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the number of attempts.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the first wait and the growth factor.
    pub fn with_backoff(mut self, backoff: Duration, factor: u32) -> Self {
        self.backoff = backoff;
        self.factor = factor;
        self
    }

    /// Wait after failed attempt number `attempt` (counting from 1).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let growth = self.factor.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(growth).min(self.max_backoff)
    }

    /// Calls `f` until it succeeds, fails with an error that is not retryable, or the
    /// attempts are used up. Returns the last result.
    pub fn run<R>(&self, mut f: impl FnMut() -> Result<R>) -> Result<R> {
        let mut attempt = 1;
        loop {
            match f() {
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    let wait = self.backoff_for(attempt);
                    debug!("attempt {attempt}/{} failed ({e}), retrying in {wait:?}", self.attempts);
                    thread::sleep(wait);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
