//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream attempts with a deadline
//! - Cancel the attempt cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; expiry drops the attempt future, which
//!   releases its connection
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

/// The deadline of an attempt passed before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Run `fut` under `deadline`.
pub async fn with_deadline<F: Future>(
    deadline: Duration,
    fut: F,
) -> Result<F::Output, DeadlineExceeded> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}
