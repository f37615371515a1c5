//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FlowConfig (validated, immutable)
//!     → handed to the subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - Ambient sections have defaults; flow-control and resilience parameters
//!   must be spelled out in the file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackoffConfig, CircuitBreakerConfig, CorrelationConfig, DemandConfig, FlowConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, RetryConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
