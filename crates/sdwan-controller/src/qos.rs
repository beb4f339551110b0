//! Traffic classification for forwarding priority

use crate::config::QosConfig;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Voice traffic and DSCP EF
pub const PRIORITY_VOICE: u16 = 200;
/// High-priority services and DSCP AF4x
pub const PRIORITY_HIGH: u16 = 150;
/// Any other ToS marking
pub const PRIORITY_MARKED: u16 = 100;
/// Best effort
pub const PRIORITY_BEST_EFFORT: u16 = 1;

const DSCP_EF: u8 = 46;
const DSCP_AF4X_LOW: u8 = 32;
const DSCP_AF4X_HIGH: u8 = 38;

const ETH_TYPE_LLDP: u16 = 0x88cc;

/// Transport header summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    /// TCP segment
    Tcp {
        /// Source port
        src_port: u16,
        /// Destination port
        dst_port: u16,
    },
    /// UDP datagram
    Udp {
        /// Source port
        src_port: u16,
        /// Destination port
        dst_port: u16,
    },
    /// Any other protocol
    Other,
}

/// IPv4 header summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Info {
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
    /// Type-of-service byte
    pub tos: u8,
    /// Transport header
    pub transport: Transport,
}

impl Ipv4Info {
    /// DSCP code point (upper six bits of ToS)
    pub fn dscp(&self) -> u8 {
        self.tos >> 2
    }
}

/// Narrowed packet-in signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInfo {
    /// Ingress port
    pub in_port: u32,
    /// Source hardware address
    pub eth_src: String,
    /// Destination hardware address
    pub eth_dst: String,
    /// Ethernet type
    pub eth_type: u16,
    /// IPv4 header, when the frame carries one
    pub ipv4: Option<Ipv4Info>,
}

impl PacketInfo {
    /// Link-layer discovery frames are never forwarded or learned from
    pub fn is_lldp(&self) -> bool {
        self.eth_type == ETH_TYPE_LLDP
    }
}

/// Derive the forwarding priority of a packet.
///
/// Port-based rules are checked before DSCP markings.
pub fn classify_priority(packet: &PacketInfo, qos: &QosConfig) -> u16 {
    let Some(ip) = packet.ipv4.as_ref() else {
        return PRIORITY_BEST_EFFORT;
    };

    match ip.transport {
        Transport::Udp { src_port, dst_port }
            if qos.voip_ports.contains(&src_port) || qos.voip_ports.contains(&dst_port) =>
        {
            return PRIORITY_VOICE;
        }
        Transport::Tcp { src_port, dst_port }
            if qos.high_priority_ports.contains(&src_port)
                || qos.high_priority_ports.contains(&dst_port) =>
        {
            return PRIORITY_HIGH;
        }
        _ => {}
    }

    match ip.dscp() {
        DSCP_EF => PRIORITY_VOICE,
        DSCP_AF4X_LOW..=DSCP_AF4X_HIGH => PRIORITY_HIGH,
        _ if ip.tos > 0 => PRIORITY_MARKED,
        _ => PRIORITY_BEST_EFFORT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip_packet(transport: Transport, tos: u8) -> PacketInfo {
        PacketInfo {
            in_port: 1,
            eth_src: "00:00:00:00:00:01".into(),
            eth_dst: "00:00:00:00:00:02".into(),
            eth_type: 0x0800,
            ipv4: Some(Ipv4Info {
                src: Ipv4Addr::new(10, 1, 1, 10),
                dst: Ipv4Addr::new(10, 2, 1, 10),
                tos,
                transport,
            }),
        }
    }

    fn classify(transport: Transport, tos: u8) -> u16 {
        classify_priority(&ip_packet(transport, tos), &QosConfig::default())
    }

    #[test]
    fn test_voip_ports() {
        assert_eq!(classify(Transport::Udp { src_port: 40000, dst_port: 5060 }, 0), 200);
        assert_eq!(classify(Transport::Udp { src_port: 5061, dst_port: 40000 }, 0), 200);
        // SIP port over TCP is not voice
        assert_eq!(classify(Transport::Tcp { src_port: 40000, dst_port: 5060 }, 0), 1);
    }

    #[test]
    fn test_high_priority_ports() {
        assert_eq!(classify(Transport::Tcp { src_port: 51000, dst_port: 443 }, 0), 150);
        assert_eq!(classify(Transport::Tcp { src_port: 22, dst_port: 51000 }, 0), 150);
    }

    #[test]
    fn test_dscp_markings() {
        let other = Transport::Other;
        assert_eq!(classify(other, 46 << 2), 200);
        assert_eq!(classify(other, 32 << 2), 150);
        assert_eq!(classify(other, 38 << 2), 150);
        assert_eq!(classify(other, 10 << 2), 100);
        assert_eq!(classify(other, 0x01), 100);
        assert_eq!(classify(other, 0), 1);
    }

    #[test]
    fn test_port_rules_win_over_dscp() {
        // TCP/443 marked EF stays at the port-based priority
        assert_eq!(classify(Transport::Tcp { src_port: 50000, dst_port: 443 }, 46 << 2), 150);
    }

    #[test]
    fn test_non_ip_is_best_effort() {
        let packet = PacketInfo {
            in_port: 1,
            eth_src: "00:00:00:00:00:01".into(),
            eth_dst: "ff:ff:ff:ff:ff:ff".into(),
            eth_type: 0x0806,
            ipv4: None,
        };
        assert_eq!(classify_priority(&packet, &QosConfig::default()), 1);
        assert!(!packet.is_lldp());
    }
}
