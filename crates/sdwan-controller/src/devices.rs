//! Connected device table
//!
//! Address learning, flow counts and bandwidth per network device.

use crate::flowplane::{FlowStat, OutPort, PortStat};
use crate::DeviceId;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

/// Byte-counter baseline for bandwidth estimation
#[derive(Debug, Clone, Copy)]
struct ByteSample {
    total_bytes: u64,
    at: Instant,
}

/// State kept for one connected device
#[derive(Debug, Default)]
pub struct DeviceState {
    /// Learned hardware address -> ingress port
    hw_to_port: HashMap<String, u32>,
    /// Flows reported by the last statistics reply
    flow_count: usize,
    /// Last byte-counter sample
    last_sample: Option<ByteSample>,
    /// Last computed throughput
    bandwidth_mbps: f64,
    /// Port counters from the last port statistics reply
    ports: BTreeMap<u32, PortStat>,
}

/// Per-device summary for status display and snapshots
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    /// Device id
    pub device: DeviceId,
    /// Hardware addresses learned on the device
    pub learned_addresses: usize,
    /// Flows reported by the last statistics reply
    pub flows: usize,
    /// Throughput from the last two statistics replies
    pub bandwidth_mbps: f64,
}

/// Table of connected devices
#[derive(Default)]
pub struct DeviceTable {
    devices: DashMap<DeviceId, DeviceState>,
}

impl DeviceTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Returns false if it was already known.
    pub fn connect(&self, device: DeviceId) -> bool {
        let mut inserted = false;
        self.devices.entry(device).or_insert_with(|| {
            inserted = true;
            DeviceState::default()
        });
        inserted
    }

    /// Forget a device
    pub fn disconnect(&self, device: DeviceId) {
        self.devices.remove(&device);
    }

    /// Whether `device` completed its handshake
    pub fn is_connected(&self, device: DeviceId) -> bool {
        self.devices.contains_key(&device)
    }

    /// Whether no device is connected
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Connected devices in ascending id order
    pub fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Learn `hw_addr` behind `port` and resolve the output port for `dst`.
    ///
    /// Unknown destinations are flooded. Returns `None` for unknown devices.
    pub fn learn_and_resolve(
        &self,
        device: DeviceId,
        hw_addr: &str,
        port: u32,
        dst: &str,
    ) -> Option<OutPort> {
        let mut state = self.devices.get_mut(&device)?;
        state.hw_to_port.insert(hw_addr.to_string(), port);

        Some(
            state
                .hw_to_port
                .get(dst)
                .map(|p| OutPort::Port(*p))
                .unwrap_or(OutPort::Flood),
        )
    }

    /// Ingest a flow statistics reply and update the bandwidth estimate.
    ///
    /// The first reply only establishes a baseline.
    pub fn record_flow_stats(&self, device: DeviceId, stats: &[FlowStat]) -> Option<f64> {
        let mut state = self.devices.get_mut(&device)?;
        let now = Instant::now();
        let total_bytes: u64 = stats.iter().map(|s| s.byte_count).sum();

        state.flow_count = stats.len();

        if let Some(prev) = state.last_sample {
            let elapsed = now.duration_since(prev.at).as_secs_f64();
            if elapsed > 0.0 {
                let delta = total_bytes.saturating_sub(prev.total_bytes) as f64;
                state.bandwidth_mbps = (delta * 8.0) / (elapsed * 1_000_000.0);
            }
        }

        state.last_sample = Some(ByteSample { total_bytes, at: now });
        Some(state.bandwidth_mbps)
    }

    /// Ingest a port statistics reply
    pub fn record_port_stats(&self, device: DeviceId, stats: &[PortStat]) {
        if let Some(mut state) = self.devices.get_mut(&device) {
            state.ports = stats.iter().map(|s| (s.port_no, *s)).collect();
        }
    }

    /// Port counters from the last reply
    pub fn port_stats(&self, device: DeviceId) -> Vec<PortStat> {
        self.devices
            .get(&device)
            .map(|s| s.ports.values().copied().collect())
            .unwrap_or_default()
    }

    /// Current bandwidth per device
    pub fn bandwidth(&self) -> BTreeMap<DeviceId, f64> {
        self.devices
            .iter()
            .map(|e| (*e.key(), e.value().bandwidth_mbps))
            .collect()
    }

    /// Summaries in ascending id order
    pub fn summaries(&self) -> Vec<DeviceSummary> {
        let mut out: Vec<DeviceSummary> = self
            .devices
            .iter()
            .map(|e| DeviceSummary {
                device: *e.key(),
                learned_addresses: e.value().hw_to_port.len(),
                flows: e.value().flow_count,
                bandwidth_mbps: e.value().bandwidth_mbps,
            })
            .collect();
        out.sort_by_key(|s| s.device);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn flow(bytes: u64) -> FlowStat {
        FlowStat {
            priority: 1,
            packet_count: bytes / 100,
            byte_count: bytes,
            duration_sec: 1,
        }
    }

    #[test]
    fn test_connect_is_idempotent() {
        let table = DeviceTable::new();
        assert!(table.connect(DeviceId(1)));
        assert!(!table.connect(DeviceId(1)));
        assert!(table.connect(DeviceId(2)));
        assert_eq!(table.ids(), vec![DeviceId(1), DeviceId(2)]);
    }

    #[test]
    fn test_learning_resolves_ports() {
        let table = DeviceTable::new();
        table.connect(DeviceId(1));

        // Destination unknown yet
        let out = table.learn_and_resolve(DeviceId(1), "aa:aa:aa:aa:aa:01", 1, "aa:aa:aa:aa:aa:02");
        assert_eq!(out, Some(OutPort::Flood));

        // Reply teaches the second address
        let out = table.learn_and_resolve(DeviceId(1), "aa:aa:aa:aa:aa:02", 2, "aa:aa:aa:aa:aa:01");
        assert_eq!(out, Some(OutPort::Port(1)));

        assert!(table.learn_and_resolve(DeviceId(9), "x", 1, "y").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bandwidth_from_byte_deltas() {
        let table = DeviceTable::new();
        table.connect(DeviceId(1));

        assert_eq!(table.record_flow_stats(DeviceId(1), &[flow(1_000_000)]), Some(0.0));

        tokio::time::advance(Duration::from_secs(10)).await;
        // 12.5 MB more in 10s = 10 Mbps
        let mbps = table
            .record_flow_stats(DeviceId(1), &[flow(5_000_000), flow(8_500_000)])
            .unwrap();
        assert!((mbps - 10.0).abs() < 1e-9);

        let summary = &table.summaries()[0];
        assert_eq!(summary.flows, 2);
    }

    #[test]
    fn test_port_stats_replace_previous() {
        let table = DeviceTable::new();
        table.connect(DeviceId(1));

        let port = |n| PortStat { port_no: n, rx_packets: 10, ..PortStat::default() };
        table.record_port_stats(DeviceId(1), &[port(1), port(2)]);
        table.record_port_stats(DeviceId(1), &[port(3)]);

        let stats = table.port_stats(DeviceId(1));
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].port_no, 3);
    }
}
