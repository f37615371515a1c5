//! Correlation middleware.
//!
//! Resolves the correlation context for every inbound request, stores it in the
//! request extensions for handlers, and echoes the id on the response.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};

use crate::correlation::CorrelationContext;

/// State for the correlation middleware.
#[derive(Debug, Clone)]
pub struct CorrelationLayerState {
    pub header: HeaderName,
}

impl CorrelationLayerState {
    pub fn new(header: HeaderName) -> Arc<Self> {
        Arc::new(Self { header })
    }
}

/// Middleware function resolving the correlation id.
pub async fn correlation_middleware(
    State(state): State<Arc<CorrelationLayerState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = CorrelationContext::from_headers(request.headers(), state.header.clone());

    tracing::debug!(
        correlation_id = %ctx.id(),
        method = %request.method(),
        path = %request.uri().path(),
        "Correlation resolved"
    );

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;
    ctx.apply(response.headers_mut());
    response
}
