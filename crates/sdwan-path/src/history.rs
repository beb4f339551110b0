//! Bounded measurement history and latency spike detection

use crate::{Measurement, ANOMALY_FLOOR_MS, ANOMALY_WINDOW, HISTORY_CAPACITY};
use serde::Serialize;
use std::collections::VecDeque;

/// Latency spike found in the most recent window of a path's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anomaly {
    /// Latency of the newest sample
    pub current_ms: f64,
    /// Mean latency over the inspected window (newest sample included)
    pub average_ms: f64,
}

/// Per-path FIFO of recent measurements.
///
/// Holds at most [`HISTORY_CAPACITY`] entries; the oldest entry is dropped
/// when a new one would overflow it. Insertion order is temporal order.
#[derive(Debug, Clone)]
pub struct PathHistory {
    samples: VecDeque<Measurement>,
    capacity: usize,
}

impl PathHistory {
    /// Create an empty history with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Create an empty history holding at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a measurement, evicting the oldest one on overflow.
    pub fn push(&mut self, measurement: Measurement) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(measurement);
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Newest sample
    pub fn latest(&self) -> Option<&Measurement> {
        self.samples.back()
    }

    /// Samples oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.samples.iter()
    }

    /// Check the newest sample for a latency spike.
    ///
    /// Needs at least [`ANOMALY_WINDOW`] samples. The average covers exactly
    /// the last window, newest sample included. A spike is reported when the
    /// newest latency exceeds twice that average and also exceeds
    /// [`ANOMALY_FLOOR_MS`]. There is no debounce: a sustained spike is
    /// reported on every call.
    pub fn detect_spike(&self) -> Option<Anomaly> {
        if self.samples.len() < ANOMALY_WINDOW {
            return None;
        }

        let window = self.samples.iter().skip(self.samples.len() - ANOMALY_WINDOW);
        let total: f64 = window.map(|m| m.latency_ms).sum();
        let average_ms = total / ANOMALY_WINDOW as f64;
        let current_ms = self.samples.back()?.latency_ms;

        if current_ms > average_ms * 2.0 && current_ms > ANOMALY_FLOOR_MS {
            Some(Anomaly { current_ms, average_ms })
        } else {
            None
        }
    }
}

impl Default for PathHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(latencies: &[f64]) -> PathHistory {
        let mut history = PathHistory::new();
        for &latency in latencies {
            history.push(Measurement::new(latency, 0.0));
        }
        history
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut history = PathHistory::new();
        for i in 0..50 {
            history.push(Measurement::new(i as f64, 0.0));
            assert!(history.len() <= HISTORY_CAPACITY);
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_fifo_eviction() {
        let latencies: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let history = history_of(&latencies);

        let kept: Vec<f64> = history.iter().map(|m| m.latency_ms).collect();
        assert_eq!(kept.first(), Some(&5.0));
        assert_eq!(kept.last(), Some(&24.0));
        assert_eq!(history.latest().map(|m| m.latency_ms), Some(24.0));
    }

    #[test]
    fn test_spike_detected() {
        let history = history_of(&[10.0, 10.0, 10.0, 10.0, 60.0]);
        let anomaly = history.detect_spike().expect("spike expected");
        assert_eq!(anomaly.current_ms, 60.0);
        assert_eq!(anomaly.average_ms, 20.0);
    }

    #[test]
    fn test_needs_full_window() {
        let history = history_of(&[10.0, 10.0, 10.0, 300.0]);
        assert!(history.detect_spike().is_none());
    }

    #[test]
    fn test_floor_suppresses_small_spikes() {
        // 45 > 2 * 13 but stays under the 50ms floor
        let history = history_of(&[5.0, 5.0, 5.0, 5.0, 45.0]);
        assert!(history.detect_spike().is_none());
    }

    #[test]
    fn test_window_ignores_older_samples() {
        // Old high samples must not inflate the average
        let history = history_of(&[500.0, 500.0, 500.0, 10.0, 10.0, 10.0, 10.0, 60.0]);
        assert!(history.detect_spike().is_some());
    }

    #[test]
    fn test_sustained_spike_keeps_firing() {
        let mut history = history_of(&[10.0, 10.0, 10.0, 10.0, 60.0]);
        assert!(history.detect_spike().is_some());

        // avg(10, 10, 10, 60, 100) = 38, 100 > 76
        history.push(Measurement::new(100.0, 0.0));
        assert!(history.detect_spike().is_some());
    }
}
