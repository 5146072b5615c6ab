//! Bounded polling with an explicit policy.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::retry::BackoffStrategy;
use super::sleeper::Sleeper;

/// How often and how long to poll an upstream resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Maximum number of probes.
    pub max_attempts: usize,
    /// Wait between probes in milliseconds.
    pub interval_ms: u64,
    /// How the wait grows between probes.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Upper bound on a single wait in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

fn default_max_interval_ms() -> u64 {
    300_000
}

impl PollPolicy {
    /// Creates a fixed-interval policy.
    #[must_use]
    pub fn fixed(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            backoff: BackoffStrategy::Constant,
            max_interval_ms: default_max_interval_ms(),
        }
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the maximum single wait.
    #[must_use]
    pub fn with_max_interval(mut self, max: Duration) -> Self {
        self.max_interval_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Wait after probe number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        Duration::from_millis(
            self.backoff
                .delay_ms(self.interval_ms, attempt, self.max_interval_ms),
        )
    }

    /// Worst-case total wait if every probe stays pending.
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for(attempt))
            .sum()
    }
}

/// What a single probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// A terminal state was reached.
    Done(T),
    /// Not terminal yet, probe again.
    Pending,
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A probe reached a terminal state.
    Resolved {
        /// Terminal value.
        value: T,
        /// Probes used, including the resolving one.
        attempts: usize,
    },
    /// Every probe stayed pending.
    Exhausted {
        /// Probes used.
        attempts: usize,
    },
}

/// Probes until a terminal state, an error, or the policy runs out.
///
/// Errors from `probe` end the loop immediately. The sleeper is only used
/// between probes, never after the last one.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    mut probe: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<PollStep<T>, E>>,
{
    for attempt in 0..policy.max_attempts {
        match probe(attempt).await? {
            PollStep::Done(value) => {
                return Ok(PollOutcome::Resolved {
                    value,
                    attempts: attempt + 1,
                });
            }
            PollStep::Pending => {
                tracing::debug!(attempt = attempt + 1, max = policy.max_attempts, "Probe pending");
                if attempt + 1 < policy.max_attempts {
                    sleeper.sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Ok(PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    })
}
