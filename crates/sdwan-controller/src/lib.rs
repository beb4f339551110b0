//! SD-WAN Multi-Site Controller
//!
//! Monitors hub-to-site paths and fails traffic over to the healthiest
//! alternative when a path goes down or turns critical.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         SD-WAN CONTROLLER                           │
//! │                                                                     │
//! │  ┌──────────────────────┐        ┌───────────────────────────────┐  │
//! │  │   MONITOR SCHEDULER  │        │      FLOW-PLANE SIGNALS       │  │
//! │  │ stats | probe | score│        │ connect | port | packet-in    │  │
//! │  └──────────┬───────────┘        └───────────────┬───────────────┘  │
//! │             │                                    │                  │
//! │  ┌──────────▼────────────────────────────────────▼───────────────┐  │
//! │  │                        PATH REGISTRY                          │  │
//! │  │      history | status | learned address | last switch         │  │
//! │  └──────────────────────────────┬────────────────────────────────┘  │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐  │
//! │  │                   FAILOVER ORCHESTRATOR                       │  │
//! │  │        cooldown | best alternative | withdraw flows           │  │
//! │  └──────────────────────────────┬────────────────────────────────┘  │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐  │
//! │  │             EVENT LOG  |  METRICS SNAPSHOT                    │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod devices;
pub mod events;
pub mod failover;
pub mod flowplane;
pub mod metrics;
pub mod monitor;
pub mod qos;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use config::{ControllerConfig, MonitorConfig, PathConfig, QosConfig};
pub use devices::DeviceTable;
pub use events::{EventKind, EventLog};
pub use failover::{FailoverOrchestrator, FailoverOutcome, FailoverRecord, FailoverTrigger};
pub use flowplane::{FlowEntry, FlowMatch, FlowPlane, FlowPlaneError, LoggingFlowPlane, OutPort};
pub use monitor::MonitorScheduler;
pub use qos::PacketInfo;
pub use registry::PathRegistry;

/// Network device (datapath) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Controller error types
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),
    /// File access failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// No tracked path has this name
    #[error("unknown path: {0}")]
    UnknownPath(String),
    /// Flow-plane command failed
    #[error("flow-plane error: {0}")]
    FlowPlane(#[from] FlowPlaneError),
}

/// How a packet-in was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingDecision {
    /// Where the adapter should send the packet
    pub out_port: OutPort,
    /// Priority of the installed forwarding entry, if one was installed
    pub installed_priority: Option<u16>,
}

/// Main controller
pub struct SdwanController {
    config: ControllerConfig,
    registry: Arc<PathRegistry>,
    devices: Arc<DeviceTable>,
    flow_plane: Arc<dyn FlowPlane>,
    events: Arc<EventLog>,
    failover: Arc<FailoverOrchestrator>,
    monitor: Arc<MonitorScheduler>,
}

impl SdwanController {
    /// Build a controller from validated configuration
    pub fn new(
        config: ControllerConfig,
        prober: Arc<dyn sdwan_path::Prober>,
        flow_plane: Arc<dyn FlowPlane>,
        events: Arc<EventLog>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;

        let registry = Arc::new(PathRegistry::new(&config.paths, config.thresholds));
        let devices = Arc::new(DeviceTable::new());
        let failover = Arc::new(FailoverOrchestrator::new(
            registry.clone(),
            devices.clone(),
            flow_plane.clone(),
            events.clone(),
            config.monitor.failover_cooldown(),
        ));
        let monitor = Arc::new(MonitorScheduler::new(
            registry.clone(),
            devices.clone(),
            flow_plane.clone(),
            prober,
            failover.clone(),
            events.clone(),
            config.monitor.clone(),
            Duration::from_secs(config.probe.timeout_secs),
            PathBuf::from(&config.metrics_path),
        ));

        Ok(Self {
            config,
            registry,
            devices,
            flow_plane,
            events,
            failover,
            monitor,
        })
    }

    /// Run the monitor loop. Never returns.
    pub async fn run(&self) {
        self.events
            .record(EventKind::System, "SD-WAN Controller Initialized with Active Failover");
        self.monitor.clone().run().await;
    }

    /// Log shutdown and flush the event log
    pub fn shutdown(&self) {
        info!("Shutting down SD-WAN controller");
        self.events.record(EventKind::System, "SD-WAN Controller shutting down");
        self.events.close();
    }

    /// A device completed its handshake
    pub async fn on_device_connected(&self, device: DeviceId) {
        if !self.devices.connect(device) {
            debug!(%device, "device reconnected");
        }
        info!(%device, "Switch connected: DPID={}", device);
        self.events
            .record(EventKind::Switch, format!("Switch {} connected", device));

        if let Err(e) = self.install_table_miss(device).await {
            error!(%device, "Failed to install table-miss entry: {}", e);
        }
        if let Err(e) = self.flow_plane.request_stats(device).await {
            warn!(%device, "stats request failed: {}", e);
        }
    }

    async fn install_table_miss(&self, device: DeviceId) -> Result<(), ControllerError> {
        self.flow_plane
            .install_flow(device, FlowEntry::table_miss())
            .await?;
        Ok(())
    }

    /// A device went away
    pub fn on_device_disconnected(&self, device: DeviceId) {
        self.devices.disconnect(device);
        warn!(%device, "Switch disconnected: DPID={}", device);
        self.events
            .record(EventKind::Switch, format!("Switch {} disconnected", device));
    }

    /// Port added, removed or modified on a device
    pub async fn on_port_status(
        &self,
        device: DeviceId,
        status: flowplane::PortStatus,
    ) -> Vec<(String, FailoverOutcome)> {
        self.events.record(
            EventKind::PortStatus,
            format!("DPID={} Port={} {}", device, status.port_no, status.reason.as_str()),
        );

        if !status.is_tunnel_down() {
            return Vec::new();
        }

        warn!(%device, port = %status.name, "Tunnel {} is DOWN", status.name);
        self.events.record(
            EventKind::TunnelDown,
            format!("{} on DPID={}", status.name, device),
        );
        self.on_link_down(device, &status.name).await
    }

    /// Mark every path traversing `device` DOWN and attempt failover.
    ///
    /// Goes through the same cooldown as the scheduled cycle.
    pub async fn on_link_down(&self, device: DeviceId, interface: &str) -> Vec<(String, FailoverOutcome)> {
        let affected = self.registry.paths_using(device);
        info!(
            %device,
            interface,
            paths = affected.len(),
            "Link down, recalculating affected paths"
        );

        let mut outcomes = Vec::with_capacity(affected.len());
        for record in affected {
            record.lock().await.status = sdwan_path::PathStatus::Down;

            let outcome = self
                .failover
                .consider_failover(record.name(), FailoverTrigger::LinkDown)
                .await;
            outcomes.push((record.name().to_string(), outcome));
        }
        outcomes
    }

    /// Cache the hardware address observed for a path's remote site
    pub async fn on_learned_address(&self, path: &str, hw_addr: &str) -> Result<(), ControllerError> {
        if self.registry.set_learned_hw_addr(path, hw_addr).await {
            Ok(())
        } else {
            Err(ControllerError::UnknownPath(path.to_string()))
        }
    }

    /// Learn, classify and forward a packet punted to the controller.
    ///
    /// Returns `None` for discovery frames and unknown devices.
    pub async fn on_packet_in(&self, device: DeviceId, packet: PacketInfo) -> Option<ForwardingDecision> {
        if packet.is_lldp() {
            return None;
        }

        let Some(out_port) =
            self.devices
                .learn_and_resolve(device, &packet.eth_src, packet.in_port, &packet.eth_dst)
        else {
            debug!(%device, "packet-in from unknown device");
            return None;
        };

        if let Some(ip) = packet.ipv4 {
            if let Some(record) = self.registry.by_target(IpAddr::V4(ip.src)) {
                self.registry
                    .set_learned_hw_addr(record.name(), &packet.eth_src)
                    .await;
            }
        }

        let OutPort::Port(port) = out_port else {
            return Some(ForwardingDecision {
                out_port,
                installed_priority: None,
            });
        };

        let priority = qos::classify_priority(&packet, &self.config.qos);
        if let Some(ip) = packet.ipv4 {
            if priority >= qos::PRIORITY_MARKED {
                info!(priority, "High priority flow: {} -> {}", ip.src, ip.dst);
                self.events.record(
                    EventKind::Qos,
                    format!("High priority flow: {}->{}", ip.src, ip.dst),
                );
            }
        }

        let matcher = FlowMatch {
            in_port: Some(packet.in_port),
            eth_dst: Some(packet.eth_dst.clone()),
            eth_src: Some(packet.eth_src.clone()),
        };

        let installed_priority = match self
            .flow_plane
            .install_flow(device, FlowEntry::learned(priority, matcher, port))
            .await
        {
            Ok(()) => Some(priority),
            Err(e) => {
                error!(%device, "Failed to install flow: {}", e);
                None
            }
        };

        Some(ForwardingDecision {
            out_port,
            installed_priority,
        })
    }

    /// Flow statistics reply
    pub fn on_stats_reply(&self, device: DeviceId, stats: &[flowplane::FlowStat]) {
        if let Some(mbps) = self.devices.record_flow_stats(device, stats) {
            debug!(%device, flows = stats.len(), mbps, "flow stats");
        }
    }

    /// Port statistics reply
    pub fn on_port_stats_reply(&self, device: DeviceId, stats: &[flowplane::PortStat]) {
        self.devices.record_port_stats(device, stats);
        for s in stats {
            debug!(
                %device,
                port = s.port_no,
                rx_packets = s.rx_packets,
                tx_packets = s.tx_packets,
                rx_errors = s.rx_errors,
                tx_errors = s.tx_errors,
                "port stats"
            );
        }
    }

    /// Loaded configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Path registry
    pub fn registry(&self) -> &Arc<PathRegistry> {
        &self.registry
    }

    /// Connected devices
    pub fn devices(&self) -> &Arc<DeviceTable> {
        &self.devices
    }

    /// Event log
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Failover orchestrator
    pub fn failover(&self) -> &Arc<FailoverOrchestrator> {
        &self.failover
    }

    /// Monitor scheduler
    pub fn monitor(&self) -> &Arc<MonitorScheduler> {
        &self.monitor
    }
}
