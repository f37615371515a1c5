//! Resilient flow library: paced consumption and resilient upstream calls.

pub mod config;
pub mod correlation;
pub mod flow;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::FlowConfig;
pub use correlation::{CorrelationContext, CorrelationId};
pub use flow::{DemandController, DemandHandle};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, Outcome, ResilienceError, ResilientClient};
