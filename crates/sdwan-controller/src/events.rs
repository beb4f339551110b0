//! Controller Event Log
//!
//! Append-only, one line per event: `[YYYY-MM-DD HH:MM:SS] KIND: message`.
//! Every entry is mirrored to `tracing` and kept in a bounded in-memory
//! ring for inspection.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

const RECENT_CAPACITY: usize = 1024;

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Controller lifecycle
    System,
    /// Device connect and disconnect
    Switch,
    /// Port added, removed or modified
    PortStatus,
    /// Tunnel port lost its link
    TunnelDown,
    /// High-priority flow installed
    Qos,
    /// Latency spike on a path
    Anomaly,
    /// Failover decisions
    Failover,
}

impl EventKind {
    /// Log name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Switch => "SWITCH",
            Self::PortStatus => "PORT_STATUS",
            Self::TunnelDown => "TUNNEL_DOWN",
            Self::Qos => "QOS",
            Self::Anomaly => "ANOMALY",
            Self::Failover => "FAILOVER",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged event
#[derive(Debug, Clone, Serialize)]
pub struct ControllerEvent {
    /// Local time the event was recorded
    pub timestamp: DateTime<Local>,
    /// Event category
    pub kind: EventKind,
    /// Free-form description
    pub message: String,
}

impl ControllerEvent {
    /// Render as a log line (without trailing newline)
    pub fn line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.message
        )
    }
}

/// Event log shared by every controller component
pub struct EventLog {
    sink: Mutex<Option<BufWriter<File>>>,
    recent: Mutex<VecDeque<ControllerEvent>>,
}

impl EventLog {
    /// Open (truncating) the log file at `path`
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            sink: Mutex::new(Some(BufWriter::new(file))),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
        })
    }

    /// Log kept in memory only
    pub fn in_memory() -> Self {
        Self {
            sink: Mutex::new(None),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
        }
    }

    /// Record an event
    pub fn record(&self, kind: EventKind, message: impl Into<String>) {
        let event = ControllerEvent {
            timestamp: Local::now(),
            kind,
            message: message.into(),
        };

        match kind {
            EventKind::TunnelDown => tracing::error!(kind = %kind, "{}", event.message),
            EventKind::Anomaly | EventKind::Failover => {
                tracing::warn!(kind = %kind, "{}", event.message)
            }
            _ => tracing::info!(kind = %kind, "{}", event.message),
        }

        if let Some(sink) = self.sink.lock().as_mut() {
            let written = writeln!(sink, "{}", event.line()).and_then(|_| sink.flush());
            if let Err(e) = written {
                tracing::error!("Failed to write event log: {}", e);
            }
        }

        let mut recent = self.recent.lock();
        if recent.len() == RECENT_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    /// Recent events, oldest first
    pub fn recent(&self) -> Vec<ControllerEvent> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Recent events of one kind
    pub fn recent_of(&self, kind: EventKind) -> Vec<ControllerEvent> {
        self.recent
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Flush and close the file sink
    pub fn close(&self) {
        if let Some(mut sink) = self.sink.lock().take() {
            if let Err(e) = sink.flush() {
                tracing::error!("Failed to flush event log: {}", e);
            }
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::in_memory()
    }
}
