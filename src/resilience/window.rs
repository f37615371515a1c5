//! Sliding window of recent call outcomes.

use std::collections::VecDeque;

use tokio::time::Instant;

/// One classified call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord {
    pub success: bool,
    pub recorded_at: Instant,
}

impl CallRecord {
    pub fn now(success: bool) -> Self {
        Self {
            success,
            recorded_at: Instant::now(),
        }
    }
}

/// Fixed-capacity ring of the most recent records.
///
/// Holds at most `capacity` records; pushing into a full window evicts the
/// oldest one. The failure count is maintained incrementally.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    capacity: usize,
    records: VecDeque<CallRecord>,
    failures: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            failures: 0,
        }
    }

    pub fn push(&mut self, record: CallRecord) {
        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                if !evicted.success {
                    self.failures -= 1;
                }
            }
        }

        if !record.success {
            self.failures += 1;
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Failure rate in percent of the window capacity.
    pub fn failure_rate(&self) -> f64 {
        self.failures as f64 * 100.0 / self.capacity as f64
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.failures = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter()
    }
}
