//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream call:
//!     → client.rs (orchestrates one logical call)
//!     → circuit_breaker.rs (gate; sliding window in window.rs)
//!     → timeouts.rs (deadline per attempt)
//!     → outcome.rs (classify response or error)
//!     → retries.rs + backoff.rs (retry or surface)
//!     → error.rs (final failure with correlation id)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Every attempt is recorded in the breaker exactly once; rejections never
//! - Circuit-open rejections fail fast, with no backoff
//! - 4xx responses are client faults: surfaced, never retried, not failures

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod outcome;
pub mod retries;
pub mod timeouts;
pub mod window;

pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreaker, CircuitOpen, CircuitSnapshot, CircuitState, Permit};
pub use client::ResilientClient;
pub use error::{FailureKind, ResilienceError};
pub use outcome::{CallResponse, FailureCause, Outcome};
pub use retries::{RetryAttempt, RetryDecision, RetryPolicy};
pub use window::{CallRecord, SlidingWindow};
