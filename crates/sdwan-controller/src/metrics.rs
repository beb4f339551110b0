//! Periodic metrics snapshot

use crate::devices::DeviceTable;
use crate::registry::PathRegistry;
use crate::ControllerError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Latest measurement of one path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathMetrics {
    /// Average round-trip time (ms)
    pub latency: f64,
    /// Packet loss (%)
    pub loss: f64,
    /// Whether any reply came back
    pub available: bool,
    /// Quality score (0-100)
    pub quality: f64,
    /// When the measurement completed
    pub timestamp: DateTime<chrono::Utc>,
}

/// Snapshot written every few monitor cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was captured
    pub timestamp: DateTime<Local>,
    /// Latest measurement per path
    pub paths: BTreeMap<String, PathMetrics>,
    /// Latency spikes seen per path
    pub anomalies: BTreeMap<String, u64>,
    /// Throughput per device id, in Mbps
    pub bandwidth: BTreeMap<String, f64>,
}

impl MetricsSnapshot {
    /// Capture the current state. Paths never measured are omitted.
    pub async fn capture(registry: &PathRegistry, devices: &DeviceTable) -> Self {
        let paths = registry
            .records()
            .filter_map(|r| {
                r.latest().map(|m| {
                    (
                        r.name().to_string(),
                        PathMetrics {
                            latency: m.latency_ms,
                            loss: m.loss_pct,
                            available: m.available,
                            quality: m.quality,
                            timestamp: m.timestamp,
                        },
                    )
                })
            })
            .collect();

        Self {
            timestamp: Local::now(),
            paths,
            anomalies: registry.anomaly_counts().await,
            bandwidth: devices
                .bandwidth()
                .into_iter()
                .map(|(d, mbps)| (d.to_string(), mbps))
                .collect(),
        }
    }

    /// Write as pretty JSON, replacing the previous snapshot
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ControllerError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write on the blocking pool. Failures are logged, never returned.
    pub async fn persist(self, path: PathBuf) {
        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || self.write_to(&target)).await;

        match result {
            Ok(Ok(())) => tracing::debug!(path = %path.display(), "metrics snapshot saved"),
            Ok(Err(e)) => tracing::error!(path = %path.display(), "Failed to save metrics: {}", e),
            Err(e) => tracing::error!("metrics writer panicked: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::DeviceId;
    use sdwan_path::Measurement;

    #[tokio::test]
    async fn test_capture_and_write() {
        let config = ControllerConfig::default();
        let registry = PathRegistry::new(&config.paths, config.thresholds);
        let devices = DeviceTable::new();
        devices.connect(DeviceId(1));

        registry.observe("HQ-to-Site1", Measurement::new(20.0, 0.0)).await;
        registry.observe("HQ-to-Site2", Measurement::unreachable()).await;

        let snapshot = MetricsSnapshot::capture(&registry, &devices).await;
        assert_eq!(snapshot.paths.len(), 2);
        assert!(!snapshot.paths["HQ-to-Site2"].available);
        assert_eq!(snapshot.anomalies.len(), 3);
        assert_eq!(snapshot.bandwidth["1"], 0.0);

        let path = std::env::temp_dir().join(format!("sdwan-metrics-{}.json", uuid::Uuid::new_v4()));
        snapshot.write_to(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["paths"]["HQ-to-Site1"]["latency"], 20.0);
        assert_eq!(value["anomalies"]["HQ-to-Site3"], 0);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_persist_failure_is_swallowed() {
        let config = ControllerConfig::default();
        let registry = PathRegistry::new(&config.paths, config.thresholds);
        let snapshot = MetricsSnapshot::capture(&registry, &DeviceTable::new()).await;

        // Directory does not exist: logged, not propagated
        snapshot
            .persist(PathBuf::from("/nonexistent-sdwan-dir/metrics.json"))
            .await;
    }
}
