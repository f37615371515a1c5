//! Errors surfaced to callers of the resilient client.

use crate::correlation::CorrelationId;
use crate::resilience::outcome::{FailureCause, Outcome};

/// Final failure of a logical call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    #[error("transient failure: {0}")]
    Transient(FailureCause),
    #[error("permanent failure: {0}")]
    Permanent(FailureCause),
    #[error("deadline exceeded")]
    TimedOut,
    #[error("circuit breaker is open")]
    CircuitOpen,
}

/// A failed logical call, traceable through its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} after {attempts} attempt(s) [correlation_id={correlation_id}]")]
pub struct ResilienceError {
    pub correlation_id: CorrelationId,
    pub attempts: u32,
    pub kind: FailureKind,
}

impl<R> Outcome<R> {
    /// Convert a final outcome into a result, attaching the correlation id to failures.
    pub fn into_result(
        self,
        correlation_id: &CorrelationId,
        attempts: u32,
    ) -> Result<R, ResilienceError> {
        let kind = match self {
            Outcome::Success(value) => return Ok(value),
            Outcome::TransientFailure(cause) => FailureKind::Transient(cause),
            Outcome::PermanentFailure(cause) => FailureKind::Permanent(cause),
            Outcome::TimedOut => FailureKind::TimedOut,
            Outcome::CircuitOpenRejected => FailureKind::CircuitOpen,
        };

        Err(ResilienceError {
            correlation_id: correlation_id.clone(),
            attempts,
            kind,
        })
    }
}
