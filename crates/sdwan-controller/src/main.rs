//! SD-WAN Controller - Main Entry Point

use sdwan_controller::{ControllerConfig, EventLog, LoggingFlowPlane, SdwanController};
use sdwan_path::PingProber;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("SD-WAN Controller v{}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| "/etc/sdwan/controller.json".into());

    let config = ControllerConfig::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!("Config not loaded from {} ({}), using defaults", config_path, e);
        ControllerConfig::default()
    });

    let events = match EventLog::open(&config.event_log_path) {
        Ok(log) => log,
        Err(e) => {
            tracing::warn!("Cannot open event log {}: {}", config.event_log_path, e);
            EventLog::in_memory()
        }
    };

    let prober = Arc::new(PingProber::new(config.probe.clone()));
    let devices: BTreeSet<_> = config
        .paths
        .iter()
        .flat_map(|p| [p.hub_device, p.site_device])
        .collect();

    let controller = SdwanController::new(
        config,
        prober,
        Arc::new(LoggingFlowPlane::new()),
        Arc::new(events),
    )?;

    // No southbound session: treat every configured device as connected
    for device in devices {
        controller.on_device_connected(device).await;
    }

    tokio::select! {
        _ = controller.run() => {},
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        }
    }

    controller.shutdown();
    Ok(())
}
