//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is re-attempted, and after which delay
//! - Enforce the attempt limit
//!
//! # Design Decisions
//! - Transient failures and timeouts are retryable, client faults never are
//! - A circuit-open rejection is surfaced at once and costs no backoff
//! - The retryable predicate only refines transient causes

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::Backoff;
use crate::resilience::outcome::{FailureCause, Outcome};

type RetryablePredicate = Arc<dyn Fn(&FailureCause) -> bool + Send + Sync>;

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Surface,
}

/// Progress of one logical invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based number of the current attempt.
    pub attempt: u32,
    /// Total time spent backing off so far.
    pub elapsed_backoff: Duration,
}

impl RetryAttempt {
    pub fn first() -> Self {
        Self {
            attempt: 1,
            elapsed_backoff: Duration::ZERO,
        }
    }

    pub fn advance(&mut self, delay: Duration) {
        self.attempt += 1;
        self.elapsed_backoff += delay;
    }
}

/// Bounded retry policy.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable: RetryablePredicate,
}

impl RetryPolicy {
    /// Policy retrying every transient cause. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable: Arc::new(|_| true),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let non_retryable: Vec<u16> = config.non_retryable_statuses.clone();
        Self::new(config.max_attempts, Backoff::from(&config.backoff)).with_predicate(
            move |cause| match cause {
                FailureCause::Status(status) => !non_retryable.contains(&status.as_u16()),
                FailureCause::Transport(_) => true,
            },
        )
    }

    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&FailureCause) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Decide what follows `outcome`, produced by attempt number `attempt`.
    pub fn decide<R>(&self, outcome: &Outcome<R>, attempt: u32) -> RetryDecision {
        let retryable = match outcome {
            Outcome::TransientFailure(cause) => (self.retryable)(cause),
            Outcome::TimedOut => true,
            Outcome::Success(_) | Outcome::PermanentFailure(_) | Outcome::CircuitOpenRejected => {
                false
            }
        };

        if retryable && attempt < self.max_attempts {
            RetryDecision::RetryAfter(self.backoff.delay(attempt))
        } else {
            RetryDecision::Surface
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
