//! Bounded retry with a fixed delay.
//!
//! Retry is an explicit combinator: callers hand the operation to
//! [`RetryPolicy::execute`] and get the last error back once attempts run out.
//! The delay blocks the calling thread, which in a batch is one pool worker.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration: total attempts and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `operation`, retrying every error.
    pub fn execute<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
    {
        self.execute_when(operation, |_| true)
    }

    /// Run `operation`, retrying only errors for which `is_retryable` holds.
    ///
    /// A successful result is returned as-is, empty or not: "nothing yet" is
    /// not a fault.
    pub fn execute_when<T, E, F, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= attempts || !is_retryable(&e) {
                        if attempt > 1 {
                            warn!(attempt, error = %e, "giving up after retries");
                        }
                        return Err(e);
                    }
                    debug!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    attempt += 1;
                    if self.delay_ms > 0 {
                        std::thread::sleep(self.delay());
                    }
                }
            }
        }
    }
}
