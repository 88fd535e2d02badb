use std::time::Duration;

use rand::Rng;

use crate::{error::Failure, HttpRequest, ResponseEnvelope, RetryOptions};

/// One execution of a request inside the retry loop.
#[derive(Debug)]
pub struct Attempt<'a> {
    pub request: &'a HttpRequest,
    /// 1-based attempt number.
    pub index: u32,
    pub outcome: &'a Result<ResponseEnvelope, Failure>,
}

/// Whether to run another attempt, and how long to wait first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub wait: Duration,
}

impl RetryDecision {
    pub const STOP: Self = Self {
        retry: false,
        wait: Duration::ZERO,
    };
}

/// Bounded retry with exponential backoff and jitter.
///
/// Transport failures and 5xx responses are retried; everything else,
/// including cancellation, is final.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    options: RetryOptions,
}

impl RetryPolicy {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn max_attempts(&self) -> u32 {
        self.options.max_attempts.max(1)
    }

    pub fn should_retry(&self, attempt: &Attempt<'_>) -> RetryDecision {
        if attempt.index >= self.max_attempts() {
            return RetryDecision::STOP;
        }
        if self.options.idempotent_only && !attempt.request.is_idempotent() {
            return RetryDecision::STOP;
        }
        let transient = match attempt.outcome {
            Ok(response) => response.is_server_error(),
            Err(Failure::Timeout { .. } | Failure::Transport(_)) => true,
            Err(Failure::Cancelled) => false,
        };
        if !transient {
            return RetryDecision::STOP;
        }
        RetryDecision {
            retry: true,
            wait: self.backoff(attempt.index),
        }
    }

    /// Wait after the `failed_attempt`-th attempt:
    /// `2^failed_attempt * base + [0, max_jitter)` milliseconds.
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        Duration::from_millis(
            self.backoff_floor_ms(failed_attempt)
                .saturating_add(self.jitter_ms()),
        )
    }

    /// Backoff without jitter.
    pub fn backoff_floor_ms(&self, failed_attempt: u32) -> u64 {
        let multiplier = 1u64 << failed_attempt.min(16);
        self.options.base_delay_ms.saturating_mul(multiplier)
    }

    fn jitter_ms(&self) -> u64 {
        if self.options.max_jitter_ms == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..self.options.max_jitter_ms)
    }
}
