use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::store::StoreError;

/// Retry policy for ambiguous conditional-write outcomes: bounded attempts
/// with linear backoff (`base_delay × attempt`). Injected into the services
/// so tests can substitute a zero-delay policy.
///
/// Only `StoreError::Ambiguous` is retried. Retrying a conditional insert is
/// safe: if the lost attempt actually committed, the retry observes the key
/// as present and reports not-applied; if it didn't, the retry gets a fresh
/// chance. Exhausting attempts surfaces the final ambiguity to the caller —
/// success is never assumed when the outcome is unknown.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Production defaults: 5 attempts, 0.1 s × attempt between them.
    pub fn standard() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        }
    }

    /// Same attempt budget, no sleeping. For tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Drives `op` until it yields anything other than `Ambiguous`, or the
    /// attempt budget runs out.
    pub async fn run<T, F, Fut>(&self, op_name: &'static str, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Err(e) if e.is_ambiguous() && attempt < self.max_attempts => {
                    metrics::counter!(crate::observability::CAS_RETRIES_TOTAL).increment(1);
                    warn!("{op_name}: ambiguous outcome on attempt {attempt}, retrying");
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) if e.is_ambiguous() => {
                    warn!("{op_name}: still ambiguous after {attempt} attempts, giving up");
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}
