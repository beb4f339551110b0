//! SD-WAN Path Health
//!
//! Measurement, scoring and classification of site-to-site transport paths.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌──────────────┐
//! │  Prober  │──▶│ Measurement │──▶│  History  │──▶│   Anomaly    │
//! │ (ping)   │   │  + quality  │   │ (FIFO 20) │   │  (window 5)  │
//! └──────────┘   └──────┬──────┘   └───────────┘   └──────────────┘
//!                       │
//!                       ▼
//!                ┌─────────────┐
//!                │  Classifier │──▶ OK | HIGH_LATENCY | LOSS | CRITICAL | DOWN
//!                └─────────────┘
//! ```
//!
//! Everything in this crate is free of shared state. The controller crate
//! owns the per-path records and decides when to fail over.

#![warn(missing_docs)]

pub mod history;
pub mod measurement;
pub mod probes;
pub mod scorer;
pub mod status;

pub use history::{Anomaly, PathHistory};
pub use measurement::Measurement;
pub use probes::{PingProber, ProbeError, ProbeSettings, Prober};
pub use scorer::quality_score;
pub use status::{PathStatus, Thresholds};

/// Latency reported for a path that could not be measured.
pub const UNREACHABLE_LATENCY_MS: f64 = 999.0;

/// Maximum number of measurements retained per path.
pub const HISTORY_CAPACITY: usize = 20;

/// Number of most recent samples inspected by the anomaly detector.
pub const ANOMALY_WINDOW: usize = 5;

/// Spikes at or below this latency are never reported as anomalies.
pub const ANOMALY_FLOOR_MS: f64 = 50.0;
