//! Response mapping for resilient calls.
//!
//! # Responsibilities
//! - Relay a successful upstream response to the client
//! - Map surfaced failures to HTTP status codes
//! - Carry the correlation id in every error body
//!
//! # Design Decisions
//! - Open circuit results in 503 Service Unavailable
//! - Deadline exceeded results in 504 Gateway Timeout
//! - Upstream 4xx is passed through unchanged, other failures are 502

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::resilience::{FailureCause, FailureKind, ResilienceError};

/// JSON body returned for failed calls.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
    pub attempts: u32,
}

impl ResilienceError {
    /// HTTP status a surfaced failure is reported with.
    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            FailureKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
            FailureKind::Permanent(FailureCause::Status(status)) => *status,
            FailureKind::Permanent(FailureCause::Transport(_)) | FailureKind::Transient(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Upstream status of the last attempt, if one answered.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match &self.kind {
            FailureKind::Transient(FailureCause::Status(status))
            | FailureKind::Permanent(FailureCause::Status(status)) => Some(*status),
            _ => None,
        }
    }
}

impl IntoResponse for ResilienceError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind.to_string(),
            correlation_id: self.correlation_id.to_string(),
            attempts: self.attempts,
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Relay a successful upstream response, keeping its status and content type.
pub async fn relay(response: reqwest::Response) -> Response {
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();

    match response.bytes().await {
        Ok(bytes) => {
            let mut relayed = Response::new(Body::from(bytes));
            *relayed.status_mut() = status;
            if let Some(value) = content_type {
                relayed.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            relayed
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read upstream body");
            (StatusCode::BAD_GATEWAY, "Failed to read upstream body").into_response()
        }
    }
}
