//! Path status classification

use crate::Measurement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static classification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Latency above which a path is flagged as slow (ms)
    pub latency_warn_ms: f64,
    /// Latency above which a path needs failover (ms)
    pub latency_critical_ms: f64,
    /// Loss above which a path is flagged as lossy (%)
    pub loss_warn_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latency_warn_ms: 50.0,
            latency_critical_ms: 100.0,
            loss_warn_pct: 5.0,
        }
    }
}

/// Health status of a path, recomputed from scratch every cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathStatus {
    /// Not measured yet
    #[default]
    Unknown,
    /// Within all thresholds
    Ok,
    /// Latency above the warning threshold (advisory)
    HighLatency,
    /// Loss above the warning threshold (advisory)
    Loss,
    /// Latency above the critical threshold
    Critical,
    /// Unreachable
    Down,
}

impl PathStatus {
    /// Classify a fresh measurement.
    ///
    /// Rules are evaluated in priority order and the first match wins:
    /// unreachable, critical latency, high latency, high loss.
    pub fn classify(measurement: &Measurement, thresholds: &Thresholds) -> Self {
        if !measurement.available {
            Self::Down
        } else if measurement.latency_ms > thresholds.latency_critical_ms {
            Self::Critical
        } else if measurement.latency_ms > thresholds.latency_warn_ms {
            Self::HighLatency
        } else if measurement.loss_pct > thresholds.loss_warn_pct {
            Self::Loss
        } else {
            Self::Ok
        }
    }

    /// Whether this status should trigger the failover orchestrator
    pub fn needs_action(&self) -> bool {
        matches!(self, Self::Down | Self::Critical)
    }

    /// Wire / log name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Ok => "OK",
            Self::HighLatency => "HIGH_LATENCY",
            Self::Loss => "LOSS",
            Self::Critical => "CRITICAL",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(latency: f64, loss: f64) -> PathStatus {
        PathStatus::classify(&Measurement::new(latency, loss), &Thresholds::default())
    }

    #[test]
    fn test_healthy_path_is_ok() {
        let status = classify(20.0, 0.0);
        assert_eq!(status, PathStatus::Ok);
        assert!(!status.needs_action());
    }

    #[test]
    fn test_unreachable_is_down() {
        let status = PathStatus::classify(&Measurement::unreachable(), &Thresholds::default());
        assert_eq!(status, PathStatus::Down);
        assert!(status.needs_action());
    }

    #[test]
    fn test_critical_latency() {
        let status = classify(150.0, 0.0);
        assert_eq!(status, PathStatus::Critical);
        assert!(status.needs_action());
    }

    #[test]
    fn test_advisory_statuses() {
        assert_eq!(classify(75.0, 0.0), PathStatus::HighLatency);
        assert_eq!(classify(20.0, 8.0), PathStatus::Loss);
        assert!(!PathStatus::HighLatency.needs_action());
        assert!(!PathStatus::Loss.needs_action());
    }

    #[test]
    fn test_priority_order() {
        // High latency wins over high loss
        assert_eq!(classify(75.0, 8.0), PathStatus::HighLatency);
        // Critical wins over everything but down
        assert_eq!(classify(150.0, 50.0), PathStatus::Critical);
        // Down wins over critical latency
        assert_eq!(classify(999.0, 100.0), PathStatus::Down);
    }

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(PathStatus::default(), PathStatus::Unknown);
        assert!(!PathStatus::default().needs_action());
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        assert_eq!(classify(50.0, 5.0), PathStatus::Ok);
        assert_eq!(classify(100.0, 0.0), PathStatus::HighLatency);
    }
}
