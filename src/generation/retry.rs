use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::GenerationError;
use crate::{RagError, Result};

/// Bounded exponential backoff for rate-limited generation calls.
///
/// Attempts are numbered from zero. The first attempt runs immediately and
/// attempt `n >= 1` is preceded by a wait of `2^(n-1)` units. No wait follows
/// the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    unit: Duration,
}

/// Where a retried call currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

/// Result of a single attempt, as far as the policy is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
}

impl RetryPolicy {
    #[inline]
    pub const fn new(max_retries: u32, unit: Duration) -> Self {
        Self { max_retries, unit }
    }

    #[inline]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[inline]
    pub const fn unit(&self) -> Duration {
        self.unit
    }

    /// Wait that precedes `attempt`
    #[inline]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }

    #[inline]
    pub const fn start(&self) -> RetryState {
        if self.max_retries == 0 {
            RetryState::Exhausted { attempts: 0 }
        } else {
            RetryState::Attempting { attempt: 0 }
        }
    }

    /// Transition after `attempt` finished with `outcome`
    #[inline]
    pub fn next(&self, attempt: u32, outcome: AttemptOutcome) -> RetryState {
        let attempts = attempt + 1;
        match outcome {
            AttemptOutcome::Success => RetryState::Succeeded { attempts },
            AttemptOutcome::RateLimited if attempts >= self.max_retries => {
                RetryState::Exhausted { attempts }
            }
            AttemptOutcome::RateLimited => RetryState::Waiting {
                attempt: attempts,
                delay: self.delay_before(attempts),
            },
        }
    }

    /// Drive `operation` to completion under this policy.
    ///
    /// Only [`GenerationError::RateLimited`] is retried; any other failure is
    /// returned immediately as [`RagError::Generation`].
    pub async fn run<T, F>(&self, mut operation: F) -> Result<T>
    where
        T: Send,
        F: FnMut(u32) -> std::result::Result<T, GenerationError> + Send,
    {
        let mut state = self.start();
        let mut value = None;

        loop {
            match state {
                RetryState::Attempting { attempt } => {
                    debug!("Generation attempt {}/{}", attempt + 1, self.max_retries);
                    let outcome = match operation(attempt) {
                        Ok(result) => {
                            value = Some(result);
                            AttemptOutcome::Success
                        }
                        Err(GenerationError::RateLimited(message)) => {
                            debug!("Attempt {} rate limited: {}", attempt + 1, message);
                            AttemptOutcome::RateLimited
                        }
                        Err(GenerationError::Service(message)) => {
                            error!("Generation failed, not retrying: {}", message);
                            return Err(RagError::Generation(message));
                        }
                    };
                    state = self.next(attempt, outcome);
                }
                RetryState::Waiting { attempt, delay } => {
                    warn!(
                        "Rate limit hit. Retrying in {:?} (attempt {}/{})",
                        delay,
                        attempt + 1,
                        self.max_retries
                    );
                    sleep(delay).await;
                    state = RetryState::Attempting { attempt };
                }
                RetryState::Succeeded { attempts } => {
                    debug!("Generation succeeded after {} attempt(s)", attempts);
                    return value.ok_or_else(|| {
                        RagError::Generation("attempt succeeded without a result".to_string())
                    });
                }
                RetryState::Exhausted { attempts } => {
                    error!("Generation gave up after {} attempts", attempts);
                    return Err(RagError::RetryExhausted { attempts });
                }
            }
        }
    }
}
