//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (Axum setup, correlation middleware, routing)
//!     → handler hands the correlation context to the resilient client
//!     → upstream.rs (outbound GET with the correlation header)
//!     → response.rs (relay the response or map the surfaced failure)
//!     → Send to client
//! ```

pub mod response;
pub mod server;
pub mod upstream;

pub use response::ErrorBody;
pub use server::{AppState, HttpServer};
pub use upstream::{HttpUpstream, UpstreamError};
