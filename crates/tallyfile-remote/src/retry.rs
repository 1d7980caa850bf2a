//! Retry with exponential backoff or server-suggested waits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

use tallyfile_core::{FailureClass, RemoteError, RetryConfig};

/// Something that can pause the current thread.
pub trait Sleeper {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps for real.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested waits instead of sleeping. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All waits requested so far.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}

/// A remote call that could not be completed.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The remote rejected the call in a way retrying cannot fix.
    #[error("{description} failed: {source}")]
    Permanent {
        description: String,
        #[source]
        source: RemoteError,
    },

    /// Every attempt failed with a retryable error.
    #[error("Retries exhausted for {description} after {attempts} attempts: {last}")]
    Exhausted {
        description: String,
        attempts: u32,
        #[source]
        last: RemoteError,
    },
}

impl RetryError {
    /// The last error reported by the remote.
    pub fn remote_error(&self) -> &RemoteError {
        match self {
            Self::Permanent { source, .. } => source,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Wraps remote calls with a bounded retry budget.
///
/// Every attempt is counted, successful or not.
#[derive(Debug)]
pub struct RetryPolicy<S = ThreadSleeper> {
    config: RetryConfig,
    sleeper: S,
    calls: u64,
}

impl RetryPolicy<ThreadSleeper> {
    /// Create a policy that sleeps for real.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_sleeper(config, ThreadSleeper)
    }
}

impl<S: Sleeper> RetryPolicy<S> {
    /// Create a policy with a custom sleeper.
    pub fn with_sleeper(config: RetryConfig, sleeper: S) -> Self {
        Self {
            config,
            sleeper,
            calls: 0,
        }
    }

    /// Attempts made through this policy.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// The policy's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails permanently, or the budget
    /// runs out. No wait follows the final failed attempt.
    pub fn execute<T>(
        &mut self,
        description: &str,
        mut operation: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, RetryError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            self.calls += 1;
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let wait = match err.class() {
                FailureClass::Permanent => {
                    error!(call = description, error = %err, "Permanent remote error");
                    return Err(RetryError::Permanent {
                        description: description.to_string(),
                        source: err,
                    });
                }
                FailureClass::RateLimited { retry_after } => {
                    retry_after.unwrap_or_else(|| self.config.backoff(attempt))
                }
                FailureClass::Transient => self.config.backoff(attempt),
            };

            attempt += 1;
            if attempt >= max_attempts {
                error!(call = description, attempts = attempt, error = %err, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    description: description.to_string(),
                    attempts: attempt,
                    last: err,
                });
            }

            warn!(
                call = description,
                attempt,
                wait_secs = wait.as_secs_f64(),
                error = %err,
                "Remote call failed, backing off"
            );
            self.sleeper.sleep(wait);
        }
    }
}
