//! Flow-Plane Adapter
//!
//! The controller never touches the southbound protocol directly. It issues
//! narrow commands through [`FlowPlane`] and receives narrowed signals
//! (device connect, port status, packet-in, stats replies) through the
//! `on_*` methods of [`crate::SdwanController`].

use crate::DeviceId;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Idle timeout for learned forwarding entries (seconds)
pub const FLOW_IDLE_TIMEOUT_SECS: u16 = 30;
/// Hard timeout for learned forwarding entries (seconds)
pub const FLOW_HARD_TIMEOUT_SECS: u16 = 60;

/// Flow-plane command errors
#[derive(Debug, Error)]
pub enum FlowPlaneError {
    /// No session with the device
    #[error("device {0} is not connected")]
    DeviceNotConnected(DeviceId),
    /// The device refused the command
    #[error("device rejected command: {0}")]
    Rejected(String),
}

/// Output port of a forwarding action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutPort {
    /// Physical or logical port number
    Port(u32),
    /// All ports except the ingress one
    Flood,
    /// Punt to the controller
    Controller,
}

impl fmt::Display for OutPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(n) => write!(f, "{}", n),
            Self::Flood => f.write_str("FLOOD"),
            Self::Controller => f.write_str("CONTROLLER"),
        }
    }
}

/// Match criteria. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMatch {
    /// Ingress port
    pub in_port: Option<u32>,
    /// Destination hardware address
    pub eth_dst: Option<String>,
    /// Source hardware address
    pub eth_src: Option<String>,
}

impl FlowMatch {
    /// Match everything
    pub fn any() -> Self {
        Self::default()
    }

    /// Match a destination hardware address
    pub fn destined_to(hw_addr: &str) -> Self {
        Self {
            eth_dst: Some(hw_addr.into()),
            ..Self::default()
        }
    }
}

/// Forwarding entry to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    /// Entry priority, higher wins
    pub priority: u16,
    /// Packets the entry applies to
    pub matcher: FlowMatch,
    /// Forwarding action
    pub out_port: OutPort,
    /// Seconds without traffic before removal (0 = never)
    pub idle_timeout_secs: u16,
    /// Seconds before unconditional removal (0 = never)
    pub hard_timeout_secs: u16,
}

impl FlowEntry {
    /// Catch-all entry sending unmatched packets to the controller
    pub fn table_miss() -> Self {
        Self {
            priority: 0,
            matcher: FlowMatch::any(),
            out_port: OutPort::Controller,
            idle_timeout_secs: 0,
            hard_timeout_secs: 0,
        }
    }

    /// Learned unicast entry with the standard timeouts
    pub fn learned(priority: u16, matcher: FlowMatch, out_port: u32) -> Self {
        Self {
            priority,
            matcher,
            out_port: OutPort::Port(out_port),
            idle_timeout_secs: FLOW_IDLE_TIMEOUT_SECS,
            hard_timeout_secs: FLOW_HARD_TIMEOUT_SECS,
        }
    }
}

/// Why a port status message was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortReason {
    /// Port appeared
    Add,
    /// Port went away
    Delete,
    /// Port state or config changed
    Modify,
    /// Reason code not recognised
    Unknown,
}

impl PortReason {
    /// Log name of the reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Modify => "MODIFY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Narrowed port status signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatus {
    /// Port number
    pub port_no: u32,
    /// Interface name
    pub name: String,
    /// What changed
    pub reason: PortReason,
    /// Link-down bit of the port state
    pub link_down: bool,
}

impl PortStatus {
    /// A tunnel port that just lost its link
    pub fn is_tunnel_down(&self) -> bool {
        self.name.to_lowercase().contains("gre")
            && self.reason == PortReason::Modify
            && self.link_down
    }
}

/// Per-flow counters from a statistics reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStat {
    /// Priority of the flow entry
    pub priority: u16,
    /// Packets matched
    pub packet_count: u64,
    /// Bytes matched
    pub byte_count: u64,
    /// Seconds the entry has been installed
    pub duration_sec: u32,
}

/// Per-port counters from a statistics reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStat {
    /// Port number
    pub port_no: u32,
    /// Received packets
    pub rx_packets: u64,
    /// Transmitted packets
    pub tx_packets: u64,
    /// Received bytes
    pub rx_bytes: u64,
    /// Transmitted bytes
    pub tx_bytes: u64,
    /// Receive errors
    pub rx_errors: u64,
    /// Transmit errors
    pub tx_errors: u64,
    /// Packets dropped on receive
    pub rx_dropped: u64,
    /// Packets dropped on transmit
    pub tx_dropped: u64,
}

/// Southbound command surface
///
/// All commands are best-effort: callers log failures and carry on.
#[async_trait]
pub trait FlowPlane: Send + Sync {
    /// Install a forwarding entry on a device
    async fn install_flow(&self, device: DeviceId, entry: FlowEntry) -> Result<(), FlowPlaneError>;

    /// Remove every forwarding entry on a device matching `matcher`
    async fn delete_flows(&self, device: DeviceId, matcher: FlowMatch) -> Result<(), FlowPlaneError>;

    /// Ask a device for flow and port statistics
    async fn request_stats(&self, device: DeviceId) -> Result<(), FlowPlaneError>;
}

/// Command issued through a [`LoggingFlowPlane`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowCommand {
    /// [`FlowPlane::install_flow`]
    Install(DeviceId, FlowEntry),
    /// [`FlowPlane::delete_flows`]
    Delete(DeviceId, FlowMatch),
    /// [`FlowPlane::request_stats`]
    RequestStats(DeviceId),
}

/// Adapter without a southbound session.
///
/// Logs and records every command. Used by the standalone binary and by
/// tests.
#[derive(Default)]
pub struct LoggingFlowPlane {
    commands: Mutex<Vec<FlowCommand>>,
}

impl LoggingFlowPlane {
    /// Adapter with an empty command record
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands issued so far
    pub fn commands(&self) -> Vec<FlowCommand> {
        self.commands.lock().clone()
    }

    /// Delete commands issued so far
    pub fn deletions(&self) -> Vec<(DeviceId, FlowMatch)> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                FlowCommand::Delete(d, m) => Some((*d, m.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl FlowPlane for LoggingFlowPlane {
    async fn install_flow(&self, device: DeviceId, entry: FlowEntry) -> Result<(), FlowPlaneError> {
        tracing::debug!(
            %device,
            priority = entry.priority,
            out_port = %entry.out_port,
            "install flow"
        );
        self.commands.lock().push(FlowCommand::Install(device, entry));
        Ok(())
    }

    async fn delete_flows(&self, device: DeviceId, matcher: FlowMatch) -> Result<(), FlowPlaneError> {
        tracing::info!(%device, eth_dst = ?matcher.eth_dst, "Deleted flows on DPID={}", device);
        self.commands.lock().push(FlowCommand::Delete(device, matcher));
        Ok(())
    }

    async fn request_stats(&self, device: DeviceId) -> Result<(), FlowPlaneError> {
        tracing::trace!(%device, "stats request");
        self.commands.lock().push(FlowCommand::RequestStats(device));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, reason: PortReason, link_down: bool) -> PortStatus {
        PortStatus {
            port_no: 3,
            name: name.into(),
            reason,
            link_down,
        }
    }

    #[test]
    fn test_tunnel_down_detection() {
        assert!(port("gre-site1", PortReason::Modify, true).is_tunnel_down());
        assert!(port("s1-GRE2", PortReason::Modify, true).is_tunnel_down());
        assert!(!port("gre-site1", PortReason::Modify, false).is_tunnel_down());
        assert!(!port("gre-site1", PortReason::Delete, true).is_tunnel_down());
        assert!(!port("eth1", PortReason::Modify, true).is_tunnel_down());
    }

    #[test]
    fn test_learned_entry_timeouts() {
        let entry = FlowEntry::learned(150, FlowMatch::destined_to("00:00:00:00:00:02"), 2);
        assert_eq!(entry.idle_timeout_secs, 30);
        assert_eq!(entry.hard_timeout_secs, 60);
        assert_eq!(entry.out_port, OutPort::Port(2));
    }

    #[tokio::test]
    async fn test_logging_adapter_records() {
        let plane = LoggingFlowPlane::new();
        plane.install_flow(DeviceId(1), FlowEntry::table_miss()).await.unwrap();
        plane
            .delete_flows(DeviceId(1), FlowMatch::destined_to("00:00:00:00:00:02"))
            .await
            .unwrap();

        assert_eq!(plane.commands().len(), 2);
        assert_eq!(plane.deletions()[0].0, DeviceId(1));
    }
}
