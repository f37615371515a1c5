//! Correlation identifiers.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → middleware.rs (resolve id from header or generate one)
//!     → CorrelationContext stored in request extensions
//!     → handler passes the context by value to the resilient client
//!     → every outbound request carries the header (CorrelationContext::apply)
//!     → every surfaced error carries the id (ResilienceError)
//!     → inbound response echoes the header
//! ```
//!
//! # Design Decisions
//! - Explicit value passing, no task-local state
//! - Immutable once resolved; cloning is a refcount bump
//! - Header name is configurable, `request-uuid` by default

pub mod middleware;

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

pub use middleware::{correlation_middleware, CorrelationLayerState};

/// Default header used to carry the correlation id.
pub const DEFAULT_CORRELATION_HEADER: &str = "request-uuid";

/// Opaque correlation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Generate a fresh random id (UUID v4).
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request correlation context: the resolved id plus the header it travels in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    id: CorrelationId,
    header: HeaderName,
}

impl CorrelationContext {
    /// Build a context around an existing id.
    pub fn new(id: CorrelationId, header: HeaderName) -> Self {
        Self { id, header }
    }

    /// Build a context with a freshly generated id.
    pub fn generate(header: HeaderName) -> Self {
        Self::new(CorrelationId::generate(), header)
    }

    /// Resolve the id from inbound headers.
    ///
    /// The first value of `header` is used verbatim. A missing header, an empty
    /// value or a value that is not visible ASCII yields a generated id.
    pub fn from_headers(headers: &HeaderMap, header: HeaderName) -> Self {
        let inbound = headers
            .get_all(&header)
            .iter()
            .next()
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty());

        match inbound {
            Some(value) => Self::new(CorrelationId::from(value), header),
            None => {
                tracing::trace!(header = %header, "No inbound correlation id, generating one");
                Self::generate(header)
            }
        }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Attach the id to outbound headers, replacing any previous value.
    pub fn apply(&self, headers: &mut HeaderMap) {
        // from_headers only admits values that already passed to_str, and
        // generated ids are hex and dashes, so this cannot fail in practice.
        if let Ok(value) = HeaderValue::from_str(self.id.as_str()) {
            headers.insert(self.header.clone(), value);
        }
    }
}

/// Parse a configured header name, falling back to [`DEFAULT_CORRELATION_HEADER`].
pub fn header_name(configured: &str) -> HeaderName {
    HeaderName::try_from(configured)
        .unwrap_or_else(|_| HeaderName::from_static(DEFAULT_CORRELATION_HEADER))
}
