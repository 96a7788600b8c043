//! Bounded, cancellable waits for cluster state transitions.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exponential backoff policy for polling the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    /// Delay after the first unsuccessful probe
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Total time allowed; `None` waits until the condition holds or the token is cancelled
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            timeout: Some(Duration::from_secs(3600)),
        }
    }
}

impl WaitPolicy {
    /// Calculate the delay after the given (zero-based) attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(16)).unwrap_or(16);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Poll `probe` until it yields a value.
    ///
    /// `Ok(None)` means "not yet"; errors are treated as transient, logged and
    /// retried. Fails with [`Error::WaitTimeout`] once the timeout is exceeded
    /// and with [`Error::Cancelled`] as soon as `cancel` fires.
    pub async fn wait_for<T, F, Fut>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        mut probe: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(what.to_string()));
            }

            match probe().await {
                Ok(Some(value)) => {
                    debug!(attempts = attempt + 1, "Observed {}", what);
                    return Ok(value);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Probe failed while waiting for {}, retrying", what);
                }
            }

            let delay = self.delay_for_attempt(attempt);
            let elapsed = started.elapsed();
            if let Some(timeout) = self.timeout {
                if elapsed >= timeout {
                    return Err(Error::WaitTimeout {
                        what: what.to_string(),
                        elapsed,
                    });
                }
            }
            attempt = attempt.saturating_add(1);

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled(what.to_string()));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
