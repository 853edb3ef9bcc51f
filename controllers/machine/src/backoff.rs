//! # Fibonacci Backoff
//!
//! Failed reconciles are requeued after 1m, 1m, 2m, 3m, 5m, 8m and then
//! every 10m. Each Machine keeps its own position in the sequence; a
//! successful reconcile resets it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fibonacci backoff calculator, stepping in whole minutes
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_minutes` and capped at `max_minutes`.
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Current delay, advancing the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let delay = Duration::from_secs(self.current_minutes * 60);
        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next_minutes.min(self.max_minutes);
        delay
    }

    /// Restart from the minimum.
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10),
            error_count: 0,
        }
    }
}

/// Per-resource backoff, keyed by `namespace/name`
#[derive(Debug, Clone, Default)]
pub struct BackoffTracker {
    states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the delay before the next attempt along
    /// with the number of consecutive failures so far.
    pub fn record_failure(&self, key: &str) -> (Duration, u32) {
        let mut states = match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = states
            .entry(key.to_string())
            .or_insert_with(BackoffState::new);
        state.error_count += 1;
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Forget the failure history of a resource.
    pub fn reset(&self, key: &str) {
        let mut states = match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        states.remove(key);
    }

    #[cfg(test)]
    pub fn error_count(&self, key: &str) -> u32 {
        self.states
            .lock()
            .unwrap()
            .get(key)
            .map_or(0, |s| s.error_count)
    }
}
