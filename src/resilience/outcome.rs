//! Attempt outcomes and their classification.

use std::fmt;

use axum::http::StatusCode;

/// A response whose status can be classified.
pub trait CallResponse {
    fn status(&self) -> StatusCode;
}

impl CallResponse for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }
}

impl CallResponse for StatusCode {
    fn status(&self) -> StatusCode {
        *self
    }
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureCause {
    #[error("upstream responded with status {0}")]
    Status(StatusCode),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result of one attempt, or the final result of a logical call.
#[derive(Debug)]
pub enum Outcome<R> {
    Success(R),
    /// Server or transport fault, retryable.
    TransientFailure(FailureCause),
    /// Client fault, never retried.
    PermanentFailure(FailureCause),
    /// Deadline exceeded, retryable.
    TimedOut,
    /// Rejected by an open circuit without attempting the call.
    CircuitOpenRejected,
}

impl<R: CallResponse> Outcome<R> {
    /// Classify a completed attempt.
    ///
    /// Status >= 500 and transport errors are transient, 4xx are permanent,
    /// anything else is a success.
    pub fn classify<E: fmt::Display>(result: Result<R, E>) -> Self {
        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() {
                    Outcome::TransientFailure(FailureCause::Status(status))
                } else if status.is_client_error() {
                    Outcome::PermanentFailure(FailureCause::Status(status))
                } else {
                    Outcome::Success(response)
                }
            }
            Err(e) => Outcome::TransientFailure(FailureCause::Transport(e.to_string())),
        }
    }
}

impl<R> Outcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// How this outcome is recorded by the circuit breaker.
    ///
    /// `Some(true)` for failures, `Some(false)` for successes and client
    /// faults, `None` for rejections, which never touch the window.
    pub fn counts_as_failure(&self) -> Option<bool> {
        match self {
            Outcome::Success(_) | Outcome::PermanentFailure(_) => Some(false),
            Outcome::TransientFailure(_) | Outcome::TimedOut => Some(true),
            Outcome::CircuitOpenRejected => None,
        }
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::TransientFailure(_) => "transient_failure",
            Outcome::PermanentFailure(_) => "permanent_failure",
            Outcome::TimedOut => "timed_out",
            Outcome::CircuitOpenRejected => "circuit_open",
        }
    }

    pub fn map<U, F: FnOnce(R) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::TransientFailure(cause) => Outcome::TransientFailure(cause),
            Outcome::PermanentFailure(cause) => Outcome::PermanentFailure(cause),
            Outcome::TimedOut => Outcome::TimedOut,
            Outcome::CircuitOpenRejected => Outcome::CircuitOpenRejected,
        }
    }
}
