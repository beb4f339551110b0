//! Controller Configuration

use crate::{ControllerError, DeviceId};
use sdwan_path::{ProbeSettings, Thresholds};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Tracked hub-to-site paths
    pub paths: Vec<PathConfig>,
    /// Status classification thresholds
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Monitor loop timing
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Active probe settings
    #[serde(default)]
    pub probe: ProbeSettings,
    /// Traffic prioritisation
    #[serde(default)]
    pub qos: QosConfig,
    /// Append-only event log
    #[serde(default = "default_event_log_path")]
    pub event_log_path: String,
    /// Periodic metrics snapshot
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

fn default_event_log_path() -> String {
    "/tmp/sdwan_events.log".into()
}

fn default_metrics_path() -> String {
    "/tmp/sdwan_metrics.json".into()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            paths: vec![
                PathConfig::new("HQ-to-Site1", Ipv4Addr::new(10, 2, 1, 10), 1, 2),
                PathConfig::new("HQ-to-Site2", Ipv4Addr::new(10, 3, 1, 10), 1, 3),
                PathConfig::new("HQ-to-Site3", Ipv4Addr::new(10, 4, 1, 10), 1, 4),
            ],
            thresholds: Thresholds::default(),
            monitor: MonitorConfig::default(),
            probe: ProbeSettings::default(),
            qos: QosConfig::default(),
            event_log_path: default_event_log_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl ControllerConfig {
    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ControllerError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ControllerError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.paths.is_empty() {
            return Err(ControllerError::Config("no paths configured".into()));
        }

        let mut seen = HashSet::new();
        for path in &self.paths {
            if !seen.insert(path.name.as_str()) {
                return Err(ControllerError::Config(format!("duplicate path name: {}", path.name)));
            }
        }

        if self.thresholds.latency_critical_ms < self.thresholds.latency_warn_ms {
            return Err(ControllerError::Config(
                "critical latency threshold is below the warning threshold".into(),
            ));
        }

        if self.monitor.interval_secs == 0 || self.monitor.metrics_every_cycles == 0 {
            return Err(ControllerError::Config("monitor intervals must be non-zero".into()));
        }

        if self.probe.count == 0 || self.probe.timeout_secs == 0 {
            return Err(ControllerError::Config(
                "probe count and timeout must be non-zero".into(),
            ));
        }

        Ok(())
    }
}

/// One monitored path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Unique path name
    pub name: String,
    /// Probe target at the remote site
    pub target: IpAddr,
    /// Hub-side device
    pub hub_device: DeviceId,
    /// Site-side device
    pub site_device: DeviceId,
}

impl PathConfig {
    /// Build a path entry
    pub fn new(name: &str, target: impl Into<IpAddr>, hub: u64, site: u64) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            hub_device: DeviceId(hub),
            site_device: DeviceId(site),
        }
    }
}

/// Monitor loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between cycles
    pub interval_secs: u64,
    /// Seconds before the first cycle
    pub initial_delay_secs: u64,
    /// Minimum seconds between failovers of the same path
    pub failover_cooldown_secs: u64,
    /// Persist a metrics snapshot every N cycles
    pub metrics_every_cycles: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            initial_delay_secs: 5,
            failover_cooldown_secs: 30,
            metrics_every_cycles: 3,
        }
    }
}

impl MonitorConfig {
    /// Cycle period
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Delay before the first cycle
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Failover debounce window
    pub fn failover_cooldown(&self) -> Duration {
        Duration::from_secs(self.failover_cooldown_secs)
    }
}

/// Traffic prioritisation ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QosConfig {
    /// UDP ports carrying voice
    pub voip_ports: Vec<u16>,
    /// TCP ports for interactive / business-critical services
    pub high_priority_ports: Vec<u16>,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            voip_ports: vec![5060, 5061],
            high_priority_ports: vec![22, 443],
        }
    }
}
