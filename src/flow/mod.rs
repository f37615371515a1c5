//! Flow control subsystem.
//!
//! # Data Flow
//! ```text
//! source.rs (push-based items, pushed only on demand)
//!     ⇄ Subscription: request(n) / cancel()
//!     → controller.rs (batches of batch_size, pause between batches)
//!     → processing step supplied by the consumer
//! ```

pub mod controller;
pub mod source;

pub use controller::{DemandController, DemandHandle, DemandReport, DemandState, FlowError, Termination};
pub use source::{IterSource, IterSubscription, Signal, Source, SourceError, Subscription};
