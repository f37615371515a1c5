//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Ambient sections (listener, upstream, correlation, observability) have
//! defaults; the flow-control and resilience sections must be spelled out.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::correlation::DEFAULT_CORRELATION_HEADER;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlowConfig {
    /// Listener configuration.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Upstream dependency called through the resilient client.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Correlation header settings.
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Paced consumer settings.
    pub demand: DemandConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry settings.
    pub retries: RetryConfig,

    /// Timeout settings.
    pub timeouts: TimeoutConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Upper bound on the whole inbound request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Upstream dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL requests are resolved against.
    pub base_url: String,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Upper bound on `count` for the paced endpoint.
    pub max_paced_calls: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9100".to_string(),
            connect_timeout_ms: 1000,
            max_paced_calls: 100,
        }
    }
}

/// Correlation header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Header carrying the correlation id, inbound and outbound.
    pub header: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            header: DEFAULT_CORRELATION_HEADER.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Paced consumer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DemandConfig {
    /// Items requested per batch.
    pub batch_size: u32,

    /// Pause between two batches, in milliseconds.
    pub inter_batch_delay_ms: u64,
}

impl DemandConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Number of most recent calls the failure rate is computed over.
    pub window_size: usize,

    /// Failure rate, in percent, at or above which the circuit opens.
    pub failure_rate_threshold: f64,

    /// Time spent open before admitting trial calls, in milliseconds.
    pub open_wait_ms: u64,

    /// Number of trial calls admitted while half-open.
    pub half_open_trial_count: u32,
}

impl CircuitBreakerConfig {
    pub fn open_wait(&self) -> Duration {
        Duration::from_millis(self.open_wait_ms)
    }
}

/// Backoff between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffConfig {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// Delay doubles per attempt, capped at `max_ms`.
    Exponential {
        base_ms: u64,
        max_ms: u64,
        #[serde(default)]
        jitter: bool,
    },
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,

    /// Delay schedule between attempts.
    pub backoff: BackoffConfig,

    /// 5xx statuses that are surfaced without retrying.
    #[serde(default)]
    pub non_retryable_statuses: Vec<u16>,
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Deadline for a single upstream attempt, in milliseconds.
    pub request_ms: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}
