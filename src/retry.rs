/*!
 * Retry policy for address resolution
 *
 * Rule registration resolves partitions and replica addresses through remote
 * caches. Two independent budgets apply:
 *
 * - throttled calls wait the service-provided retry-after, up to a maximum
 *   number of retries and a maximum cumulative wait
 * - transient network failures back off exponentially, up to a maximum
 *   number of retries
 *
 * Anything else fails immediately.
 */

use crate::collaborators::CollaboratorResult;
use crate::config::ResolutionRetryConfig;
use crate::error::CollaboratorError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ResolutionRetryPolicy {
    config: ResolutionRetryConfig,
}

impl ResolutionRetryPolicy {
    pub fn new(config: ResolutionRetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolutionRetryConfig {
        &self.config
    }

    /// Run `op` until it succeeds or a retry budget is exhausted.
    ///
    /// `what` names the resolution step in log lines.
    pub async fn execute<F, Fut, T>(&self, what: &str, op: F) -> CollaboratorResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CollaboratorResult<T>>,
    {
        let mut throttle_retries = 0;
        let mut throttle_wait = Duration::ZERO;
        let mut network_retries = 0;
        let mut backoff = self.config.initial_backoff();

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(CollaboratorError::Throttled { retry_after })
                    if throttle_retries < self.config.max_throttle_retries
                        && throttle_wait + retry_after <= self.config.max_throttle_wait() =>
                {
                    throttle_retries += 1;
                    throttle_wait += retry_after;
                    warn!(
                        step = what,
                        attempt = throttle_retries,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Resolution throttled, retrying"
                    );
                    tokio::time::sleep(retry_after).await;
                }
                Err(e) if e.is_transient() && network_retries < self.config.max_network_retries => {
                    network_retries += 1;
                    warn!(
                        step = what,
                        attempt = network_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient resolution failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    let max_backoff = self.config.max_backoff();
                    backoff = Duration::try_from_secs_f64(
                        backoff.as_secs_f64() * self.config.backoff_multiplier,
                    )
                    .map_or(max_backoff, |next| next.min(max_backoff));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for ResolutionRetryPolicy {
    fn default() -> Self {
        Self::new(ResolutionRetryConfig::default())
    }
}
