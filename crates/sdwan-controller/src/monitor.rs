//! Monitor Scheduler
//!
//! Fixed-period cycle: request stats → probe all paths in parallel →
//! update histories → detect anomalies → classify → fail over → every Nth
//! cycle persist a metrics snapshot.

use crate::config::MonitorConfig;
use crate::devices::DeviceTable;
use crate::events::{EventKind, EventLog};
use crate::failover::{FailoverOrchestrator, FailoverOutcome, FailoverTrigger};
use crate::flowplane::FlowPlane;
use crate::metrics::MetricsSnapshot;
use crate::registry::{Observation, PathRegistry};
use sdwan_path::{Measurement, PathStatus, Prober};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one cycle did
#[derive(Debug)]
pub struct CycleReport {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// Per-path observation in name order
    pub observations: Vec<(String, Observation)>,
    /// Failover attempts made by this cycle
    pub failovers: Vec<(String, FailoverOutcome)>,
    /// Background snapshot writer, on metrics cycles
    pub metrics_task: Option<JoinHandle<()>>,
}

/// Periodic path monitor
pub struct MonitorScheduler {
    registry: Arc<PathRegistry>,
    devices: Arc<DeviceTable>,
    flow_plane: Arc<dyn FlowPlane>,
    prober: Arc<dyn Prober>,
    failover: Arc<FailoverOrchestrator>,
    events: Arc<EventLog>,
    config: MonitorConfig,
    probe_timeout: Duration,
    metrics_path: PathBuf,
    cycle: AtomicU64,
}

impl MonitorScheduler {
    /// Build a scheduler. Nothing runs until [`MonitorScheduler::run`] or
    /// [`MonitorScheduler::run_cycle`] is called.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<PathRegistry>,
        devices: Arc<DeviceTable>,
        flow_plane: Arc<dyn FlowPlane>,
        prober: Arc<dyn Prober>,
        failover: Arc<FailoverOrchestrator>,
        events: Arc<EventLog>,
        config: MonitorConfig,
        probe_timeout: Duration,
        metrics_path: PathBuf,
    ) -> Self {
        Self {
            registry,
            devices,
            flow_plane,
            prober,
            failover,
            events,
            config,
            probe_timeout,
            metrics_path,
            cycle: AtomicU64::new(0),
        }
    }

    /// Run cycles forever
    pub async fn run(self: Arc<Self>) {
        info!(
            interval = ?self.config.interval(),
            paths = self.registry.len(),
            "Monitoring loop started"
        );

        let first = Instant::now() + self.config.initial_delay() + self.config.interval();
        let mut ticker = interval_at(first, self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Cycles started so far, skipped ones included
    pub fn cycles(&self) -> u64 {
        self.cycle.load(Ordering::Relaxed)
    }

    /// Run one cycle. Returns `None` while no device is connected.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;

        if self.devices.is_empty() {
            debug!(cycle, "no devices connected, skipping cycle");
            return None;
        }

        info!(cycle, "Monitoring cycle #{}", cycle);

        self.request_stats().await;

        let measurements = self.probe_all().await;

        // Record every path first so candidate selection sees this cycle's data
        let mut observations = Vec::with_capacity(measurements.len());
        for name in self.registry.names() {
            let measurement = measurements
                .get(&name)
                .copied()
                .unwrap_or_else(Measurement::unreachable);

            let Some(observation) = self.registry.observe(&name, measurement).await else {
                continue;
            };

            if let Some(anomaly) = observation.anomaly {
                warn!(
                    path = %name,
                    current_ms = anomaly.current_ms,
                    average_ms = anomaly.average_ms,
                    "Anomaly detected on {}: latency spike", name
                );
                self.events.record(
                    EventKind::Anomaly,
                    format!("{} latency spike: {:.1}ms", name, anomaly.current_ms),
                );
            }

            observations.push((name, observation));
        }

        let mut failovers = Vec::new();
        for (name, observation) in &observations {
            self.report_status(name, observation);

            if observation.status.needs_action() {
                let outcome = self
                    .failover
                    .consider_failover(name, FailoverTrigger::Scheduled)
                    .await;
                failovers.push((name.clone(), outcome));
            }
        }

        self.log_summary().await;

        let metrics_task = if cycle % self.config.metrics_every_cycles == 0 {
            let snapshot = MetricsSnapshot::capture(&self.registry, &self.devices).await;
            Some(tokio::spawn(snapshot.persist(self.metrics_path.clone())))
        } else {
            None
        };

        Some(CycleReport {
            cycle,
            observations,
            failovers,
            metrics_task,
        })
    }

    async fn request_stats(&self) {
        for device in self.devices.ids() {
            if let Err(e) = self.flow_plane.request_stats(device).await {
                warn!(%device, "stats request failed: {}", e);
            }
        }
    }

    /// Probe every path concurrently, each bounded by the probe timeout.
    async fn probe_all(&self) -> HashMap<String, Measurement> {
        let mut set = JoinSet::new();

        for record in self.registry.records() {
            let prober = self.prober.clone();
            let name = record.name().to_string();
            let target = record.target();
            let timeout = self.probe_timeout;

            set.spawn(async move {
                let measurement = tokio::time::timeout(timeout, prober.probe(target))
                    .await
                    .unwrap_or_else(|_| Measurement::unreachable());
                (name, measurement)
            });
        }

        let mut results = HashMap::with_capacity(self.registry.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, measurement)) => {
                    results.insert(name, measurement);
                }
                Err(e) => error!("probe task failed: {}", e),
            }
        }
        results
    }

    fn report_status(&self, name: &str, observation: &Observation) {
        let thresholds = self.registry.thresholds();
        let m = &observation.measurement;

        match observation.status {
            PathStatus::Down => {
                error!(path = %name, "Path {} is DOWN", name);
                self.events.record(
                    EventKind::Failover,
                    format!("{} is down - triggering failover", name),
                );
            }
            PathStatus::Critical => {
                error!(
                    path = %name,
                    "Path {}: CRITICAL LATENCY {:.2}ms (threshold: {}ms)",
                    name, m.latency_ms, thresholds.latency_critical_ms
                );
                self.events.record(
                    EventKind::Failover,
                    format!("{} critical latency: {:.2}ms", name, m.latency_ms),
                );
            }
            PathStatus::HighLatency => warn!(
                path = %name,
                "Path {}: HIGH LATENCY {:.2}ms (threshold: {}ms)",
                name, m.latency_ms, thresholds.latency_warn_ms
            ),
            PathStatus::Loss => warn!(
                path = %name,
                "Path {}: HIGH PACKET LOSS {:.1}% (threshold: {}%)",
                name, m.loss_pct, thresholds.loss_warn_pct
            ),
            PathStatus::Ok | PathStatus::Unknown => {}
        }
    }

    async fn log_summary(&self) {
        let devices = self.devices.summaries();
        info!("Network status: {} connected devices", devices.len());
        for d in &devices {
            info!(
                "  DPID {}: {} MACs, {} flows, ~{:.2} Mbps",
                d.device, d.learned_addresses, d.flows, d.bandwidth_mbps
            );
        }

        for path in self.registry.snapshot().await {
            let Some(m) = path.latest else { continue };
            info!(
                "{} {}: latency {:.2}ms | loss {:.1}% | quality [{}] {:.0}/100",
                path.status,
                path.name,
                m.latency_ms,
                m.loss_pct,
                quality_bar(m.quality),
                m.quality
            );
            if path.anomaly_count > 0 {
                info!("  {}: {} anomalies detected", path.name, path.anomaly_count);
            }
        }
    }
}

/// Ten-cell bar, one filled cell per 10 quality points
fn quality_bar(quality: f64) -> String {
    let filled = ((quality / 10.0) as usize).min(10);
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}
