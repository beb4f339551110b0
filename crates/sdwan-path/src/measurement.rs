//! Path measurement

use crate::{scorer::quality_score, UNREACHABLE_LATENCY_MS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One active measurement of a path.
///
/// Immutable once produced. `available` and `quality` are derived from
/// latency and loss at construction time and never diverge from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// When the measurement completed
    pub timestamp: DateTime<Utc>,
    /// Average round-trip time in milliseconds (999.0 when unreachable)
    pub latency_ms: f64,
    /// Packet loss percentage (0-100)
    pub loss_pct: f64,
    /// True iff loss is below 100%
    pub available: bool,
    /// Composite quality score (0-100)
    pub quality: f64,
}

impl Measurement {
    /// Build a measurement taken now.
    pub fn new(latency_ms: f64, loss_pct: f64) -> Self {
        Self::at(Utc::now(), latency_ms, loss_pct)
    }

    /// Build a measurement with an explicit timestamp.
    ///
    /// Latency is floored at zero and loss is clamped to `[0, 100]`.
    pub fn at(timestamp: DateTime<Utc>, latency_ms: f64, loss_pct: f64) -> Self {
        let latency_ms = latency_ms.max(0.0);
        let loss_pct = loss_pct.clamp(0.0, 100.0);

        Self {
            timestamp,
            latency_ms,
            loss_pct,
            available: loss_pct < 100.0,
            quality: quality_score(latency_ms, loss_pct),
        }
    }

    /// Sentinel for a probe that timed out or failed to run.
    pub fn unreachable() -> Self {
        Self {
            timestamp: Utc::now(),
            latency_ms: UNREACHABLE_LATENCY_MS,
            loss_pct: 100.0,
            available: false,
            quality: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_follows_loss() {
        assert!(Measurement::new(20.0, 0.0).available);
        assert!(Measurement::new(20.0, 99.0).available);
        assert!(!Measurement::new(20.0, 100.0).available);
    }

    #[test]
    fn test_unreachable_sentinel() {
        let m = Measurement::unreachable();
        assert_eq!(m.latency_ms, 999.0);
        assert_eq!(m.loss_pct, 100.0);
        assert!(!m.available);
        assert_eq!(m.quality, 0.0);
    }

    #[test]
    fn test_inputs_are_bounded() {
        let m = Measurement::new(-3.0, 140.0);
        assert_eq!(m.latency_ms, 0.0);
        assert_eq!(m.loss_pct, 100.0);
        assert!(!m.available);
    }
}
