//! Resilient client: gate → attempt → classify → record → decide.
//!
//! ```text
//! execute(ctx, operation)
//!     → circuit_breaker.rs  try_acquire (Open: CircuitOpenRejected, no attempt)
//!     → timeouts.rs         run operation(ctx) under the request deadline
//!     → outcome.rs          classify the response or error
//!     → circuit_breaker.rs  record the permit exactly once
//!     → retries.rs          RetryAfter(delay) or Surface
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::FlowConfig;
use crate::correlation::CorrelationContext;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::error::ResilienceError;
use crate::resilience::outcome::{CallResponse, Outcome};
use crate::resilience::retries::{RetryAttempt, RetryDecision, RetryPolicy};
use crate::resilience::timeouts::with_deadline;

/// Wraps upstream calls with a circuit breaker, retries and a timeout.
///
/// Cloning shares the circuit breaker.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ResilientClient {
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            breaker,
            retry,
            timeout,
        }
    }

    /// Build a client with its own breaker from the resilience sections of `config`.
    pub fn from_config(name: &str, config: &FlowConfig) -> Self {
        Self::new(
            Arc::new(CircuitBreaker::new(name, config.circuit_breaker.clone())),
            RetryPolicy::from_config(&config.retries),
            config.timeouts.request(),
        )
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run one logical call and return its final outcome.
    ///
    /// `operation` is invoked once per attempt with the correlation context,
    /// which it must attach to the outbound request. Dropping the returned
    /// future cancels the in-flight attempt or pending backoff.
    pub async fn execute<F, Fut, R, E>(&self, ctx: &CorrelationContext, operation: F) -> Outcome<R>
    where
        F: FnMut(CorrelationContext) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: CallResponse,
        E: fmt::Display,
    {
        self.run(ctx, operation).await.0
    }

    /// Like [`execute`](Self::execute), surfacing failures as errors carrying the correlation id.
    pub async fn execute_result<F, Fut, R, E>(
        &self,
        ctx: &CorrelationContext,
        operation: F,
    ) -> Result<R, ResilienceError>
    where
        F: FnMut(CorrelationContext) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: CallResponse,
        E: fmt::Display,
    {
        let (outcome, attempts) = self.run(ctx, operation).await;
        outcome.into_result(ctx.id(), attempts)
    }

    async fn run<F, Fut, R, E>(&self, ctx: &CorrelationContext, mut operation: F) -> (Outcome<R>, u32)
    where
        F: FnMut(CorrelationContext) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: CallResponse,
        E: fmt::Display,
    {
        let mut progress = RetryAttempt::first();

        loop {
            let outcome = self.attempt(ctx, &mut operation).await;

            match self.retry.decide(&outcome, progress.attempt) {
                RetryDecision::Surface => {
                    if !outcome.is_success() {
                        tracing::warn!(
                            correlation_id = %ctx.id(),
                            attempts = progress.attempt,
                            backoff = ?progress.elapsed_backoff,
                            outcome = outcome.label(),
                            "Surfacing failed call"
                        );
                    } else if progress.attempt > 1 {
                        tracing::info!(
                            correlation_id = %ctx.id(),
                            attempts = progress.attempt,
                            "Call succeeded after retry"
                        );
                    }
                    return (outcome, progress.attempt);
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::info!(
                        correlation_id = %ctx.id(),
                        attempt = progress.attempt,
                        delay = ?delay,
                        outcome = outcome.label(),
                        "Retrying call"
                    );
                    metrics::record_retry();
                    tokio::time::sleep(delay).await;
                    progress.advance(delay);
                }
            }
        }
    }

    async fn attempt<F, Fut, R, E>(&self, ctx: &CorrelationContext, operation: &mut F) -> Outcome<R>
    where
        F: FnMut(CorrelationContext) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: CallResponse,
        E: fmt::Display,
    {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(
                    correlation_id = %ctx.id(),
                    breaker = %self.breaker.name(),
                    "Call rejected by open circuit"
                );
                metrics::record_attempt(Outcome::<R>::CircuitOpenRejected.label(), Duration::ZERO);
                return Outcome::CircuitOpenRejected;
            }
        };

        let started = Instant::now();
        let outcome = match with_deadline(self.timeout, operation(ctx.clone())).await {
            Ok(result) => Outcome::classify(result),
            Err(_) => Outcome::TimedOut,
        };

        self.breaker.record(permit, outcome.counts_as_failure() != Some(true));

        if let Outcome::TransientFailure(cause) | Outcome::PermanentFailure(cause) = &outcome {
            tracing::debug!(correlation_id = %ctx.id(), cause = %cause, "Attempt failed");
        }
        metrics::record_attempt(outcome.label(), started.elapsed());
        outcome
    }
}
