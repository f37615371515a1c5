//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and are recorded
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: a limited number of trial calls probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: window full and failure rate >= threshold
//! Open → Half-Open: first gate check after open_wait
//! Half-Open → Closed: every trial call succeeded (window cleared)
//! Half-Open → Open: any trial call failed (wait timer restarted)
//! ```
//!
//! # Design Decisions
//! - Window and state are mutated under one mutex
//! - Current state mirrored in an atomic for lock-free reads
//! - Every transition starts a new epoch; results carrying a permit from an
//!   older epoch are discarded, so a rejection or a stale call never touches
//!   the window

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::window::{CallRecord, SlidingWindow};

/// Circuit state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Returned by the gate when a call must not be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct CircuitOpen;

/// Admission ticket for one call. Hand it back to [`CircuitBreaker::record`].
///
/// A half-open trial permit dropped without being recorded (the call was
/// cancelled) gives its trial slot back.
#[must_use = "a permit must be recorded once the call completes"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    state: CircuitState,
    recorded: bool,
}

impl Permit<'_> {
    /// State the call was admitted in.
    pub fn state(&self) -> CircuitState {
        self.state
    }
}

impl std::fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("breaker", &self.breaker.name)
            .field("epoch", &self.epoch)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.state == CircuitState::HalfOpen {
            self.breaker.release_trial(self.epoch);
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub window_len: usize,
    pub window_failures: usize,
    pub failure_rate: f64,
    pub rejected_total: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: SlidingWindow,
    opened_at: Option<Instant>,
    epoch: u64,
    trials_issued: u32,
    trials_succeeded: u32,
}

/// Sliding-window circuit breaker shared by all calls of one client.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    state: AtomicU8,
    rejected: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = SlidingWindow::new(config.window_size);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                epoch: 0,
                trials_issued: 0,
                trials_succeeded: 0,
            }),
            state: AtomicU8::new(CircuitState::Closed as u8),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, read without taking the lock.
    ///
    /// An open breaker whose wait has elapsed still reports `Open` until the
    /// next gate check performs the transition.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Gate a call.
    pub fn try_acquire(&self) -> Result<Permit<'_>, CircuitOpen> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let waited = inner
                .opened_at
                .map(|opened_at| opened_at.elapsed() >= self.config.open_wait())
                .unwrap_or(true);
            if waited {
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }

        match inner.state {
            CircuitState::Closed => Ok(Permit {
                breaker: self,
                epoch: inner.epoch,
                state: CircuitState::Closed,
                recorded: false,
            }),
            CircuitState::HalfOpen if inner.trials_issued < self.config.half_open_trial_count => {
                inner.trials_issued += 1;
                tracing::debug!(
                    breaker = %self.name,
                    trial = inner.trials_issued,
                    "Admitting half-open trial call"
                );
                Ok(Permit {
                    breaker: self,
                    epoch: inner.epoch,
                    state: CircuitState::HalfOpen,
                    recorded: false,
                })
            }
            _ => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_rejection(&self.name);
                Err(CircuitOpen)
            }
        }
    }

    /// Record the outcome of an admitted call.
    pub fn record(&self, mut permit: Permit<'_>, success: bool) {
        permit.recorded = true;
        let mut inner = self.lock();

        if permit.epoch != inner.epoch {
            tracing::debug!(
                breaker = %self.name,
                admitted_in = %permit.state,
                current = %inner.state,
                "Discarding result from a previous circuit epoch"
            );
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.window.push(CallRecord::now(success));
                if inner.window.is_full()
                    && inner.window.failure_rate() >= self.config.failure_rate_threshold
                {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.window.failures(),
                        window = inner.window.capacity(),
                        rate = inner.window.failure_rate(),
                        "Failure rate threshold reached"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                if !success {
                    self.transition(&mut inner, CircuitState::Open);
                } else {
                    inner.trials_succeeded += 1;
                    if inner.trials_succeeded >= self.config.half_open_trial_count {
                        self.transition(&mut inner, CircuitState::Closed);
                    }
                }
            }
            // Every transition bumps the epoch, so an Open-epoch permit cannot exist.
            CircuitState::Open => {}
        }
    }

    /// Give back the slot of a trial that ended without a result.
    fn release_trial(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch == epoch && inner.state == CircuitState::HalfOpen {
            inner.trials_issued = inner.trials_issued.saturating_sub(1);
            tracing::debug!(
                breaker = %self.name,
                trials_in_flight = inner.trials_issued.saturating_sub(inner.trials_succeeded),
                "Released cancelled half-open trial"
            );
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            window_len: inner.window.len(),
            window_failures: inner.window.failures(),
            failure_rate: inner.window.failure_rate(),
            rejected_total: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Force the breaker back to Closed with an empty window.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // No panics happen while the lock is held mid-update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        inner.trials_issued = 0;
        inner.trials_succeeded = 0;

        match to {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                tracing::warn!(breaker = %self.name, from = %from, wait = ?self.config.open_wait(), "Circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, from = %from, "Circuit breaker half-open");
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.window.clear();
                tracing::info!(breaker = %self.name, from = %from, "Circuit breaker closed");
            }
        }

        self.state.store(to as u8, Ordering::Release);
        metrics::record_circuit_transition(&self.name, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: 10,
            failure_rate_threshold: 50.0,
            open_wait_ms: 1000,
            half_open_trial_count: 1,
        }
    }

    fn call(breaker: &CircuitBreaker, success: bool) {
        let permit = breaker.try_acquire().expect("call should be admitted");
        breaker.record(permit, success);
    }

    #[test]
    fn starts_closed() {
        let breaker = CircuitBreaker::new("test", test_config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn stays_closed_until_window_is_full() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..9 {
            call(&breaker, false);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        call(&breaker, false);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn half_failures_open_the_circuit() {
        let breaker = CircuitBreaker::new("test", test_config());
        for i in 0..10 {
            call(&breaker, i % 2 == 0);
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire().unwrap_err(), CircuitOpen);
        assert_eq!(breaker.snapshot().rejected_total, 1);
    }

    #[test]
    fn below_threshold_stays_closed() {
        let breaker = CircuitBreaker::new("test", test_config());
        for i in 0..10 {
            call(&breaker, i >= 4);
        }
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.window_failures, 4);
    }

    #[test]
    fn rolling_window_forgets_old_failures() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..4 {
            call(&breaker, false);
        }
        for _ in 0..20 {
            call(&breaker, true);
        }
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.window_len, 10);
        assert_eq!(snapshot.window_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_wait_leads_to_half_open_trial() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..10 {
            call(&breaker, false);
        }
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        let permit = breaker.try_acquire().expect("trial admitted");
        assert_eq!(permit.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Only one trial while it is in flight.
        assert!(breaker.try_acquire().is_err());

        breaker.record(permit, true);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.window_len, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_and_restarts_timer() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..10 {
            call(&breaker, false);
        }

        tokio::time::advance(Duration::from_secs(1)).await;
        let permit = breaker.try_acquire().expect("trial admitted");
        breaker.record(permit, false);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn all_trials_must_succeed_to_close() {
        let config = CircuitBreakerConfig {
            half_open_trial_count: 2,
            ..test_config()
        };
        let breaker = CircuitBreaker::new("test", config);
        for _ in 0..10 {
            call(&breaker, false);
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        let first = breaker.try_acquire().expect("first trial");
        let second = breaker.try_acquire().expect("second trial");
        assert!(breaker.try_acquire().is_err());

        breaker.record(first, true);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record(second, true);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn stale_results_are_discarded() {
        let breaker = CircuitBreaker::new("test", test_config());
        let late = breaker.try_acquire().unwrap();
        for _ in 0..10 {
            call(&breaker, false);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.record(late, true);
        assert_eq!(breaker.snapshot().window_failures, 10);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_gives_back_its_slot() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..10 {
            call(&breaker, false);
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        let trial = breaker.try_acquire().expect("trial admitted");
        assert!(breaker.try_acquire().is_err());
        drop(trial);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let retry = breaker.try_acquire().expect("slot released");
        breaker.record(retry, true);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_from_previous_epoch_is_ignored() {
        let config = CircuitBreakerConfig {
            half_open_trial_count: 2,
            ..test_config()
        };
        let breaker = CircuitBreaker::new("test", config);
        for _ in 0..10 {
            call(&breaker, false);
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        let abandoned = breaker.try_acquire().expect("first trial");
        let failing = breaker.try_acquire().expect("second trial");
        breaker.record(failing, false);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        let first = breaker.try_acquire().expect("first trial of new epoch");
        let second = breaker.try_acquire().expect("second trial of new epoch");
        drop(abandoned);
        assert!(breaker.try_acquire().is_err());

        breaker.record(first, true);
        breaker.record(second, true);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_keep_window_bounded() {
        let breaker = Arc::new(CircuitBreaker::new("test", test_config()));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let breaker = breaker.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let permit = breaker.try_acquire().expect("closed breaker admits");
                        tokio::task::yield_now().await;
                        breaker.record(permit, true);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.window_len, 10);
        assert_eq!(snapshot.window_failures, 0);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let breaker = breaker.clone();
                tokio::spawn(async move {
                    let permit = breaker.try_acquire().expect("closed breaker admits");
                    breaker.record(permit, false);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.window_len, 10);
        assert_eq!(snapshot.window_failures, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_open_once() {
        let config = CircuitBreakerConfig {
            open_wait_ms: 60_000,
            ..test_config()
        };
        let breaker = Arc::new(CircuitBreaker::new("test", config));
        let admitted = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let breaker = breaker.clone();
                let admitted = admitted.clone();
                let rejected = rejected.clone();
                tokio::spawn(async move {
                    match breaker.try_acquire() {
                        Ok(permit) => {
                            admitted.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            breaker.record(permit, false);
                        }
                        Err(CircuitOpen) => {
                            rejected.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.window_len, 10);
        assert_eq!(snapshot.window_failures, 10);
        assert!(admitted.load(Ordering::SeqCst) >= 10);
        assert_eq!(
            admitted.load(Ordering::SeqCst) + rejected.load(Ordering::SeqCst),
            64
        );
        assert_eq!(
            snapshot.rejected_total,
            rejected.load(Ordering::SeqCst) as u64
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_half_open_admits_trial_count() {
        let config = CircuitBreakerConfig {
            open_wait_ms: 10,
            half_open_trial_count: 3,
            ..test_config()
        };
        let breaker = Arc::new(CircuitBreaker::new("test", config));
        for _ in 0..10 {
            call(&breaker, false);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        const TASKS: usize = 32;
        let barrier = Arc::new(tokio::sync::Barrier::new(TASKS));
        let admitted = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..TASKS)
            .map(|_| {
                let breaker = breaker.clone();
                let barrier = barrier.clone();
                let admitted = admitted.clone();
                tokio::spawn(async move {
                    let permit = breaker.try_acquire().ok();
                    if permit.is_some() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    // Hold every trial until all tasks have tried the gate.
                    barrier.wait().await;
                    if let Some(permit) = permit {
                        breaker.record(permit, true);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.snapshot().rejected_total, (TASKS - 3) as u64);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn reset_closes_and_clears() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..10 {
            call(&breaker, false);
        }
        breaker.reset();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.window_len, 0);
    }
}
