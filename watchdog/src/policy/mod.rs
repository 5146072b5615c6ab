//! Retry and polling policies.
//!
//! This module provides:
//! - Transport retry with backoff and jitter
//! - Bounded poll loops driven by a `PollPolicy`
//! - A `Sleeper` seam so poll loops run without real delays in tests

mod poll;
mod retry;
mod sleeper;

pub use poll::{PollOutcome, PollPolicy, PollStep, poll_until};
pub use retry::{
    BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, should_retry, with_retry,
};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
