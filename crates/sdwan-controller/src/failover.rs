//! Failover Orchestration
//!
//! Single entry point for both the scheduled classification step and the
//! asynchronous link-down signal. Each call holds the failed path's record
//! lock from the cooldown check until the decision is recorded, so two
//! triggers for the same path can never both pass the cooldown.

use crate::devices::DeviceTable;
use crate::events::{EventKind, EventLog};
use crate::flowplane::{FlowMatch, FlowPlane};
use crate::registry::PathRegistry;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const HISTORY_LIMIT: usize = 256;

/// What caused a failover attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverTrigger {
    /// Periodic classification found the path DOWN or CRITICAL
    Scheduled,
    /// A tunnel port on one of the path's devices lost its link
    LinkDown,
}

/// Executed failover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRecord {
    /// Unique record id
    pub id: Uuid,
    /// Path that failed
    pub from: String,
    /// Path selected as its replacement
    pub to: String,
    /// What started the attempt
    pub trigger: FailoverTrigger,
    /// When the switch was decided
    pub at: DateTime<Utc>,
    /// Whether the withdraw command was issued and accepted
    pub withdrawn: bool,
}

/// Result of one `consider_failover` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// The path failed over less than one cooldown ago
    CoolingDown,
    /// Failed over to the named path
    Switched {
        /// Replacement path
        to: String,
    },
    /// Every other path is unavailable
    NoAlternative,
    /// The path is not tracked
    UnknownPath,
}

/// Failover orchestrator
pub struct FailoverOrchestrator {
    registry: Arc<PathRegistry>,
    devices: Arc<DeviceTable>,
    flow_plane: Arc<dyn FlowPlane>,
    events: Arc<EventLog>,
    cooldown: Duration,
    history: RwLock<Vec<FailoverRecord>>,
}

impl FailoverOrchestrator {
    /// Build an orchestrator with the given cooldown
    pub fn new(
        registry: Arc<PathRegistry>,
        devices: Arc<DeviceTable>,
        flow_plane: Arc<dyn FlowPlane>,
        events: Arc<EventLog>,
        cooldown: Duration,
    ) -> Self {
        Self {
            registry,
            devices,
            flow_plane,
            events,
            cooldown,
            history: RwLock::new(Vec::new()),
        }
    }

    /// Decide and execute failover for `failed`.
    ///
    /// 1. Skip silently while the path is within its cooldown.
    /// 2. Pick the available path with the highest quality (ties: lowest name).
    /// 3. Record the switch time, withdraw forwarding state toward the
    ///    failed site on its hub device, and log the switch.
    ///
    /// Installing forwarding state along the alternative is left to the
    /// flow-plane layer; this call stops once the old state is withdrawn.
    pub async fn consider_failover(&self, failed: &str, trigger: FailoverTrigger) -> FailoverOutcome {
        let Some(record) = self.registry.get(failed) else {
            tracing::warn!(path = %failed, "failover requested for unknown path");
            return FailoverOutcome::UnknownPath;
        };

        let mut state = record.lock().await;
        let now = Instant::now();

        if let Some(last) = state.last_switch {
            if now.duration_since(last) < self.cooldown {
                tracing::debug!(
                    path = %failed,
                    ?trigger,
                    since_last = ?now.duration_since(last),
                    "failover suppressed by cooldown"
                );
                return FailoverOutcome::CoolingDown;
            }
        }

        tracing::info!(path = %failed, ?trigger, "Recalculating flows for {}", failed);

        let Some((alternative, candidate)) = self.registry.best_alternative(failed) else {
            tracing::error!(path = %failed, "No alternative path available for {}", failed);
            self.events
                .record(EventKind::Failover, format!("No alternative for {}", failed));
            return FailoverOutcome::NoAlternative;
        };

        state.last_switch = Some(now);
        tracing::info!(
            path = %failed,
            alternative = %alternative,
            quality = candidate.quality,
            "Alternative path found"
        );
        self.events.record(
            EventKind::Failover,
            format!("Switching from {} to {}", failed, alternative),
        );

        let withdrawn = match state.learned_hw_addr.clone() {
            Some(hw_addr) => self.withdraw(record.hub_device(), failed, &hw_addr).await,
            None => {
                tracing::debug!(path = %failed, "no learned address, nothing to withdraw");
                false
            }
        };

        self.events.record(
            EventKind::Failover,
            format!("Successfully failed over to {}", alternative),
        );

        let mut history = self.history.write();
        if history.len() == HISTORY_LIMIT {
            history.remove(0);
        }
        history.push(FailoverRecord {
            id: Uuid::new_v4(),
            from: failed.to_string(),
            to: alternative.clone(),
            trigger,
            at: Utc::now(),
            withdrawn,
        });

        FailoverOutcome::Switched { to: alternative }
    }

    /// Best-effort delete of flows toward the failed site. Never retried.
    async fn withdraw(&self, hub: crate::DeviceId, path: &str, hw_addr: &str) -> bool {
        if !self.devices.is_connected(hub) {
            tracing::debug!(path = %path, %hub, "hub device not connected, skipping withdraw");
            return false;
        }

        match self.flow_plane.delete_flows(hub, FlowMatch::destined_to(hw_addr)).await {
            Ok(()) => {
                tracing::info!(path = %path, "Deleted flows to {}", path);
                true
            }
            Err(e) => {
                tracing::error!(path = %path, %hub, "Failed to withdraw flows: {}", e);
                false
            }
        }
    }

    /// Executed failovers, oldest first
    pub fn history(&self) -> Vec<FailoverRecord> {
        self.history.read().clone()
    }

    /// Most recent executed failover
    pub fn last_event(&self) -> Option<FailoverRecord> {
        self.history.read().last().cloned()
    }

    /// Minimum time between two failovers of one path
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
