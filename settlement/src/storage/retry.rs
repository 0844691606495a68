//! Bounded exponential backoff for ledger commits.

use std::future::Future;
use std::time::Duration;

use crate::config::{LEDGER_RETRY_ATTEMPTS, LEDGER_RETRY_BASE, LEDGER_RETRY_CAP};

/// Errors that can tell whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Outcome of a failed retried operation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last attempt still failed transiently.
    Exhausted { attempts: u32, last: E },
    /// A non-transient failure; no further attempts were made.
    Permanent(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: LEDGER_RETRY_BASE,
            cap: LEDGER_RETRY_CAP,
            retries: LEDGER_RETRY_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Runs `op` until it succeeds, fails permanently, or the retry budget
    /// is spent.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
                Err(e) if retry >= self.retries => {
                    tracing::error!(operation, attempts = retry + 1, error = %e, "ledger retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: retry + 1,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        operation,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient ledger failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
