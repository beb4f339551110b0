//! Active path probing

use crate::{Measurement, UNREACHABLE_LATENCY_MS};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::process::Output;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Internal probe failures. Never escapes [`Prober::probe`].
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe command could not be started
    #[error("failed to spawn probe: {0}")]
    Spawn(#[from] std::io::Error),
    /// The probe did not finish in time
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Measures one path toward its target endpoint.
///
/// Implementations must not fail: any timeout or execution error is
/// reported as [`Measurement::unreachable`].
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `target` and return latency and loss.
    async fn probe(&self, target: IpAddr) -> Measurement;
}

/// Ping probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Echo requests per probe
    pub count: u32,
    /// Per-reply wait in seconds
    pub wait_secs: u32,
    /// Overall bound for one probe in seconds
    pub timeout_secs: u64,
    /// Network namespace to run ping in (falls back to the host namespace)
    pub namespace: Option<String>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            count: 3,
            wait_secs: 1,
            timeout_secs: 5,
            namespace: Some("hq".into()),
        }
    }
}

/// Prober backed by the system `ping` binary
#[derive(Debug, Clone)]
pub struct PingProber {
    settings: ProbeSettings,
}

impl PingProber {
    /// Create a prober with the given settings
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    fn ping_args(&self, target: IpAddr) -> Vec<String> {
        vec![
            "-c".into(),
            self.settings.count.to_string(),
            "-W".into(),
            self.settings.wait_secs.to_string(),
            target.to_string(),
        ]
    }

    async fn run(&self, target: IpAddr) -> Result<Output, ProbeError> {
        let args = self.ping_args(target);

        if let Some(ns) = &self.settings.namespace {
            let namespaced = Command::new("sudo")
                .args(["ip", "netns", "exec", ns.as_str(), "ping"])
                .args(&args)
                .kill_on_drop(true)
                .output()
                .await;

            match namespaced {
                Ok(output) => return Ok(output),
                Err(e) => {
                    tracing::debug!(namespace = %ns, "namespaced ping unavailable ({}), using host ping", e);
                }
            }
        }

        Ok(Command::new("ping")
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?)
    }

    async fn measure(&self, target: IpAddr) -> Result<Measurement, ProbeError> {
        let timeout = self.timeout();
        let output = tokio::time::timeout(timeout, self.run(target))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (latency_ms, loss_pct) = parse_ping_output(&stdout);
        Ok(Measurement::new(latency_ms, loss_pct))
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new(ProbeSettings::default())
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, target: IpAddr) -> Measurement {
        match self.measure(target).await {
            Ok(measurement) => measurement,
            Err(e) => {
                tracing::debug!(%target, "probe failed: {}", e);
                Measurement::unreachable()
            }
        }
    }
}

fn rtt_summary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"min/avg/max/[^=]*= [\d.]+/([\d.]+)/[\d.]+").expect("valid regex"))
}

fn rtt_avg_only() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"avg = ([\d.]+)").expect("valid regex"))
}

fn loss_summary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\d.]+)% packet loss").expect("valid regex"))
}

/// Extract `(avg latency ms, loss %)` from ping output.
///
/// Missing latency reads as 999.0 and missing loss as 100.0.
pub fn parse_ping_output(output: &str) -> (f64, f64) {
    let latency = rtt_summary()
        .captures(output)
        .or_else(|| rtt_avg_only().captures(output))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(UNREACHABLE_LATENCY_MS);

    let loss = loss_summary()
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(100.0);

    (latency, loss)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_OK: &str = "\
PING 10.2.1.10 (10.2.1.10) 56(84) bytes of data.
64 bytes from 10.2.1.10: icmp_seq=1 ttl=64 time=12.1 ms
64 bytes from 10.2.1.10: icmp_seq=2 ttl=64 time=11.8 ms
64 bytes from 10.2.1.10: icmp_seq=3 ttl=64 time=12.4 ms

--- 10.2.1.10 ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2003ms
rtt min/avg/max/mdev = 11.800/12.100/12.400/0.245 ms
";

    const LINUX_PARTIAL: &str = "\
--- 10.3.1.10 ping statistics ---
3 packets transmitted, 2 received, 33.3333% packet loss, time 2010ms
rtt min/avg/max/mdev = 40.100/45.250/50.400/5.150 ms
";

    const LINUX_DEAD: &str = "\
--- 10.4.1.10 ping statistics ---
3 packets transmitted, 0 received, 100% packet loss, time 2049ms
";

    #[test]
    fn test_parse_healthy_output() {
        let (latency, loss) = parse_ping_output(LINUX_OK);
        assert_eq!(latency, 12.1);
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_parse_partial_loss() {
        let (latency, loss) = parse_ping_output(LINUX_PARTIAL);
        assert_eq!(latency, 45.25);
        assert!((loss - 33.3333).abs() < 1e-9);
    }

    #[test]
    fn test_partial_loss_is_lossy_not_down() {
        let (latency, loss) = parse_ping_output(LINUX_PARTIAL);
        let m = crate::Measurement::new(latency, loss);
        assert!(m.available);
        assert!(m.quality > 0.0);
        // 45ms stays under the latency warning, so loss decides
        assert_eq!(
            crate::PathStatus::classify(&m, &crate::Thresholds::default()),
            crate::PathStatus::Loss
        );
    }

    #[test]
    fn test_parse_dead_target() {
        let (latency, loss) = parse_ping_output(LINUX_DEAD);
        assert_eq!(latency, 999.0);
        assert_eq!(loss, 100.0);
    }

    #[test]
    fn test_parse_avg_only_format() {
        let (latency, _) = parse_ping_output("round-trip avg = 7.5 ms\n0% packet loss");
        assert_eq!(latency, 7.5);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_ping_output(""), (999.0, 100.0));
    }

    #[tokio::test]
    async fn test_timeout_yields_sentinel() {
        let prober = PingProber::new(ProbeSettings {
            timeout_secs: 0,
            namespace: None,
            ..ProbeSettings::default()
        });

        let m = prober.probe("192.0.2.1".parse().unwrap()).await;
        assert!(!m.available);
        assert_eq!(m.latency_ms, 999.0);
        assert_eq!(m.quality, 0.0);
    }
}
