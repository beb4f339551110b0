//! Path registry
//!
//! One record per configured path. The set of paths is fixed at
//! construction; records are mutated only through the methods below, each
//! of which holds the record's own lock, so the periodic cycle and the
//! link-down handler are serialized per path.

use crate::config::PathConfig;
use crate::DeviceId;
use parking_lot::RwLock;
use sdwan_path::{Anomaly, Measurement, PathHistory, PathStatus, Thresholds};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Mutable part of a path record
#[derive(Debug, Default)]
pub struct PathState {
    /// Current status
    pub status: PathStatus,
    /// Hardware address learned for the remote site
    pub learned_hw_addr: Option<String>,
    /// When the last failover away from this path started
    pub last_switch: Option<Instant>,
    /// Recent measurements
    pub history: PathHistory,
    /// Latency spikes seen so far. Never reset.
    pub anomaly_count: u64,
}

/// One tracked path
#[derive(Debug)]
pub struct PathRecord {
    config: PathConfig,
    state: Mutex<PathState>,
    /// Newest measurement, readable without taking the record lock so that
    /// candidate selection for one path never waits on another path.
    latest: RwLock<Option<Measurement>>,
}

impl PathRecord {
    fn new(config: PathConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PathState::default()),
            latest: RwLock::new(None),
        }
    }

    /// Unique path name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Probe target at the remote site
    pub fn target(&self) -> IpAddr {
        self.config.target
    }

    /// Device on the hub side of the path
    pub fn hub_device(&self) -> DeviceId {
        self.config.hub_device
    }

    /// Device on the site side of the path
    pub fn site_device(&self) -> DeviceId {
        self.config.site_device
    }

    /// Whether the path traverses `device`
    pub fn uses_device(&self, device: DeviceId) -> bool {
        self.config.hub_device == device || self.config.site_device == device
    }

    /// Newest measurement
    pub fn latest(&self) -> Option<Measurement> {
        *self.latest.read()
    }

    /// Take the record lock
    pub async fn lock(&self) -> MutexGuard<'_, PathState> {
        self.state.lock().await
    }
}

/// Result of ingesting one measurement
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    /// Measurement that was ingested
    pub measurement: Measurement,
    /// Status it classified to
    pub status: PathStatus,
    /// Latency spike found, if any
    pub anomaly: Option<Anomaly>,
}

/// Point-in-time copy of a path record
#[derive(Debug, Clone, Serialize)]
pub struct PathSnapshot {
    /// Path name
    pub name: String,
    /// Current status
    pub status: PathStatus,
    /// Newest measurement
    pub latest: Option<Measurement>,
    /// Latency spikes seen so far
    pub anomaly_count: u64,
    /// Hardware address learned for the remote site
    pub learned_hw_addr: Option<String>,
    /// Measurements retained in history
    pub history_len: usize,
}

/// Registry of all tracked paths, ordered by name
#[derive(Debug)]
pub struct PathRegistry {
    paths: BTreeMap<String, Arc<PathRecord>>,
    thresholds: Thresholds,
}

impl PathRegistry {
    /// Build from configuration. Later duplicates of a name are ignored.
    pub fn new(paths: &[PathConfig], thresholds: Thresholds) -> Self {
        let mut map = BTreeMap::new();
        for config in paths {
            map.entry(config.name.clone())
                .or_insert_with(|| Arc::new(PathRecord::new(config.clone())));
        }

        Self { paths: map, thresholds }
    }

    /// Record for `name`
    pub fn get(&self, name: &str) -> Option<Arc<PathRecord>> {
        self.paths.get(name).cloned()
    }

    /// All records in name order
    pub fn records(&self) -> impl Iterator<Item = &Arc<PathRecord>> {
        self.paths.values()
    }

    /// Path names in ascending order
    pub fn names(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    /// Number of tracked paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no path is tracked
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Classification thresholds
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Paths traversing `device`
    pub fn paths_using(&self, device: DeviceId) -> Vec<Arc<PathRecord>> {
        self.paths
            .values()
            .filter(|p| p.uses_device(device))
            .cloned()
            .collect()
    }

    /// Append a measurement, run spike detection and reclassify the path.
    ///
    /// Returns `None` for an unknown path.
    pub async fn observe(&self, name: &str, measurement: Measurement) -> Option<Observation> {
        let record = self.paths.get(name)?;
        let mut state = record.lock().await;

        state.history.push(measurement);
        *record.latest.write() = Some(measurement);

        let anomaly = state.history.detect_spike();
        if anomaly.is_some() {
            state.anomaly_count += 1;
        }

        let status = PathStatus::classify(&measurement, &self.thresholds);
        state.status = status;

        Some(Observation {
            measurement,
            status,
            anomaly,
        })
    }

    /// Cache the hardware address learned for a path's remote site
    pub async fn set_learned_hw_addr(&self, name: &str, hw_addr: &str) -> bool {
        let Some(record) = self.paths.get(name) else {
            return false;
        };

        let mut state = record.lock().await;
        if state.learned_hw_addr.as_deref() != Some(hw_addr) {
            tracing::debug!(path = %name, "Learned hardware address {}", hw_addr);
            state.learned_hw_addr = Some(hw_addr.to_string());
        }
        true
    }

    /// Path whose probe target is `addr`
    pub fn by_target(&self, addr: IpAddr) -> Option<Arc<PathRecord>> {
        self.paths.values().find(|p| p.target() == addr).cloned()
    }

    /// Best available path other than `exclude`.
    ///
    /// Highest quality wins; ties go to the lexicographically smallest
    /// name. Paths never measured are not candidates.
    pub fn best_alternative(&self, exclude: &str) -> Option<(String, Measurement)> {
        let mut best: Option<(&str, Measurement)> = None;

        for (name, record) in &self.paths {
            if name == exclude {
                continue;
            }
            let Some(m) = record.latest() else { continue };
            if !m.available {
                continue;
            }
            // Names iterate in ascending order: strict comparison keeps the first
            match best {
                Some((_, b)) if m.quality <= b.quality => {}
                _ => best = Some((name.as_str(), m)),
            }
        }

        best.map(|(name, m)| (name.to_string(), m))
    }

    /// Anomaly counters per path
    pub async fn anomaly_counts(&self) -> BTreeMap<String, u64> {
        let mut out = BTreeMap::new();
        for (name, record) in &self.paths {
            out.insert(name.clone(), record.lock().await.anomaly_count);
        }
        out
    }

    /// Copy every record
    pub async fn snapshot(&self) -> Vec<PathSnapshot> {
        let mut out = Vec::with_capacity(self.paths.len());
        for (name, record) in &self.paths {
            let state = record.lock().await;
            out.push(PathSnapshot {
                name: name.clone(),
                status: state.status,
                latest: record.latest(),
                anomaly_count: state.anomaly_count,
                learned_hw_addr: state.learned_hw_addr.clone(),
                history_len: state.history.len(),
            });
        }
        out
    }
}
