//! Self-throttling consumer.
//!
//! # Lifecycle
//! ```text
//! subscribe → request(batch_size)
//!     → Next × batch_size (each awaited through the processing step)
//!     → pause inter_batch_delay → request(batch_size) → ...
//! Complete → finish, no further request
//! Error    → surface, no further request
//! cancel   → cancel subscription at once (mid-batch, mid-item or mid-pause)
//! ```
//!
//! # Design Decisions
//! - Demand state `{requested, delivered}` is owned by the consumer task and
//!   only mutated inside it
//! - A new batch is never requested before the previous one was processed
//! - Pauses are timer suspensions; a completion arriving during a pause ends
//!   the flow without a superfluous request
//! - Dropping the cancellation sender counts as cancellation

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::DemandConfig;
use crate::flow::source::{Signal, Source, SourceError, Subscription};
use crate::observability::metrics;

/// Outstanding demand of the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandState {
    pub requested: u64,
    pub delivered: u64,
}

impl DemandState {
    fn batch(batch_size: u64) -> Self {
        Self {
            requested: batch_size,
            delivered: 0,
        }
    }

    /// Items still owed by the source in this batch.
    pub fn outstanding(&self) -> u64 {
        self.requested.saturating_sub(self.delivered)
    }
}

/// How a paced flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed,
    Cancelled,
}

/// Summary of a finished paced flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandReport {
    /// Items handed to the processing step.
    pub delivered: u64,
    /// Batches requested from the source.
    pub batches: u64,
    pub termination: Termination,
}

/// Failures of a paced flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Upstream(#[from] SourceError),
    #[error("source pushed more than the {requested} requested items")]
    Overflow { requested: u64 },
    #[error("paced consumer task failed: {0}")]
    Join(String),
}

enum Pause<T> {
    Elapsed,
    Cancelled,
    Signal(Option<Signal<T>>),
}

/// Paces consumption of a [`Source`] in fixed batches.
#[derive(Debug, Clone)]
pub struct DemandController {
    batch_size: u64,
    inter_batch_delay: Duration,
}

impl DemandController {
    /// A batch size of 0 is treated as 1.
    pub fn new(config: &DemandConfig) -> Self {
        Self {
            batch_size: u64::from(config.batch_size.max(1)),
            inter_batch_delay: config.inter_batch_delay(),
        }
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn inter_batch_delay(&self) -> Duration {
        self.inter_batch_delay
    }

    /// Consume `source` until it completes, fails or `cancel` flips to `true`.
    pub async fn run<T, S, F, Fut>(
        &self,
        source: S,
        mut cancel: watch::Receiver<bool>,
        mut process: F,
    ) -> Result<DemandReport, FlowError>
    where
        S: Source<T>,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let (mut subscription, mut signals) = source.subscribe();
        let mut report = DemandReport {
            delivered: 0,
            batches: 0,
            termination: Termination::Completed,
        };

        let mut state = self.request_batch(&mut subscription, &mut report);

        loop {
            let signal = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    return Ok(self.cancel(&mut subscription, report, state));
                }
                signal = signals.recv() => signal,
            };

            match signal {
                Some(Signal::Next(item)) => {
                    if state.outstanding() == 0 {
                        return Err(self.overflow(&mut subscription, state));
                    }

                    tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => {
                            return Ok(self.cancel(&mut subscription, report, state));
                        }
                        _ = process(item) => {}
                    }
                    state.delivered += 1;
                    report.delivered += 1;
                    metrics::record_item_processed();

                    if state.outstanding() > 0 {
                        continue;
                    }

                    match self.pause(&mut signals, &mut cancel).await {
                        Pause::Elapsed => {
                            state = self.request_batch(&mut subscription, &mut report);
                        }
                        Pause::Cancelled => {
                            return Ok(self.cancel(&mut subscription, report, state));
                        }
                        Pause::Signal(Some(Signal::Next(_))) => {
                            return Err(self.overflow(&mut subscription, state));
                        }
                        Pause::Signal(Some(Signal::Error(e))) => return Err(self.fail(e, report)),
                        Pause::Signal(Some(Signal::Complete) | None) => return Ok(self.complete(report)),
                    }
                }
                Some(Signal::Error(e)) => return Err(self.fail(e, report)),
                Some(Signal::Complete) | None => return Ok(self.complete(report)),
            }
        }
    }

    /// Consume `source` to its end, without external cancellation.
    pub async fn run_to_end<T, S, F, Fut>(&self, source: S, process: F) -> Result<DemandReport, FlowError>
    where
        S: Source<T>,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let (_keep_alive, cancel) = watch::channel(false);
        self.run(source, cancel, process).await
    }

    /// Run the flow on its own task.
    pub fn spawn<T, S, F, Fut>(&self, source: S, process: F) -> DemandHandle
    where
        T: Send + 'static,
        S: Source<T> + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let controller = self.clone();
        let task = tokio::spawn(async move { controller.run(source, cancel_rx, process).await });

        DemandHandle {
            cancel: cancel_tx,
            task,
        }
    }

    fn request_batch<S: Subscription>(&self, subscription: &mut S, report: &mut DemandReport) -> DemandState {
        subscription.request(self.batch_size);
        report.batches += 1;
        metrics::record_batch_requested(self.batch_size);
        tracing::debug!(batch = report.batches, size = self.batch_size, "Requested batch");
        DemandState::batch(self.batch_size)
    }

    async fn pause<T>(
        &self,
        signals: &mut mpsc::UnboundedReceiver<Signal<T>>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Pause<T> {
        tracing::trace!(delay = ?self.inter_batch_delay, "Batch processed, pausing");
        tokio::select! {
            biased;
            _ = cancelled(cancel) => Pause::Cancelled,
            signal = signals.recv() => Pause::Signal(signal),
            _ = tokio::time::sleep(self.inter_batch_delay) => Pause::Elapsed,
        }
    }

    fn cancel<S: Subscription>(&self, subscription: &mut S, mut report: DemandReport, state: DemandState) -> DemandReport {
        subscription.cancel();
        report.termination = Termination::Cancelled;
        tracing::info!(
            delivered = report.delivered,
            outstanding = state.outstanding(),
            "Paced flow cancelled"
        );
        report
    }

    fn complete(&self, report: DemandReport) -> DemandReport {
        tracing::info!(delivered = report.delivered, batches = report.batches, "Paced flow completed");
        report
    }

    fn fail(&self, error: SourceError, report: DemandReport) -> FlowError {
        tracing::warn!(delivered = report.delivered, error = %error, "Paced flow failed upstream");
        FlowError::Upstream(error)
    }

    fn overflow<S: Subscription>(&self, subscription: &mut S, state: DemandState) -> FlowError {
        subscription.cancel();
        tracing::error!(requested = state.requested, "Source exceeded requested demand");
        FlowError::Overflow {
            requested: state.requested,
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the wait.
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// Handle to a paced flow running on its own task.
#[derive(Debug)]
pub struct DemandHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<DemandReport, FlowError>>,
}

impl DemandHandle {
    /// Cancel the flow. The subscription is released at the consumer's next turn.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the flow to end.
    pub async fn join(self) -> Result<DemandReport, FlowError> {
        let DemandHandle { cancel, task } = self;
        let result = task.await;
        drop(cancel);
        result.unwrap_or_else(|e| Err(FlowError::Join(e.to_string())))
    }
}
