//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (batch size > 0, threshold in (0, 100], timeouts > 0)
//! - Check addresses, URLs and header names parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FlowConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use url::Url;

use crate::config::schema::{BackoffConfig, FlowConfig};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &FlowConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    if let Err(e) = Url::parse(&config.upstream.base_url) {
        errors.push(ValidationError::new(
            "upstream.base_url",
            format!("'{}' is not a URL: {e}", config.upstream.base_url),
        ));
    }

    if HeaderName::from_bytes(config.correlation.header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "correlation.header",
            format!("'{}' is not a valid header name", config.correlation.header),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if config.demand.batch_size == 0 {
        errors.push(ValidationError::new(
            "demand.batch_size",
            "must be greater than 0",
        ));
    }

    let breaker = &config.circuit_breaker;
    if breaker.window_size == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.window_size",
            "must be greater than 0",
        ));
    }
    if !(breaker.failure_rate_threshold > 0.0 && breaker.failure_rate_threshold <= 100.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_rate_threshold",
            format!(
                "{} is outside (0, 100]",
                breaker.failure_rate_threshold
            ),
        ));
    }
    if breaker.half_open_trial_count == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.half_open_trial_count",
            "must be greater than 0",
        ));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new(
            "retries.max_attempts",
            "must be at least 1",
        ));
    }
    if let BackoffConfig::Exponential { base_ms, max_ms, .. } = config.retries.backoff {
        if max_ms < base_ms {
            errors.push(ValidationError::new(
                "retries.backoff.max_ms",
                format!("{max_ms} is below base_ms {base_ms}"),
            ));
        }
    }
    for status in &config.retries.non_retryable_statuses {
        if !(500..600).contains(status) {
            errors.push(ValidationError::new(
                "retries.non_retryable_statuses",
                format!("{status} is not a 5xx status"),
            ));
        }
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::new(
            "timeouts.request_ms",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
