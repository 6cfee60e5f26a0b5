//! XGEN Monitor - polls solar inverters over MQTT
//!
//! One session per configured inverter:
//! - connects to the XGEN broker and keeps reconnecting
//! - asks for telemetry at half the scan interval (throttled by the session)
//! - keeps the latest reading of every known sensor

mod board;
mod config;
mod scheduler;
mod sensors;

use anyhow::{Context, Result};
use board::SensorBoard;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use xgen_client::Session;

const DEFAULT_LOG_FILTER: &str = "xgen_monitor=info,xgen_client=info";
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

struct Monitored {
    session: Session,
    board: Arc<SensorBoard>,
    poller: tokio::task::JoinHandle<()>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let path = config::config_path();
    let cfg = config::load_config()
        .await
        .context("Failed to load monitor configuration")?;
    info!("☀️ XGEN monitor starting with {} inverter(s) from {}", cfg.inverters.len(), path);

    let mut monitored = Vec::with_capacity(cfg.inverters.len());
    for inverter in cfg.inverters {
        let board = Arc::new(SensorBoard::new(&inverter.session.name, inverter.id.as_deref()));
        let period = inverter.session.tick_period();
        let session = Session::mqtt(inverter.session)
            .context("Failed to create inverter session")?;
        session.set_observer(board.clone());
        session.connect().await;

        let poller = scheduler::spawn_poller(session.clone(), period);
        monitored.push(Monitored { session, board, poller });
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down...");

    for entry in monitored {
        entry.session.shutdown().await;
        entry.poller.abort();
        if let Ok(Err(e)) = tokio::time::timeout(SHUTDOWN_GRACE, entry.poller).await {
            if !e.is_cancelled() {
                warn!("{}: poller ended abnormally: {}", entry.session.name(), e);
            }
        }
        let health = entry.session.health();
        let readings = entry.board.readings();
        let known = readings.iter().filter(|r| r.value.is_some()).count();
        if let Ok(dump) = serde_json::to_string(&readings) {
            debug!("{}: last readings {}", health.name, dump);
        }
        let today = entry
            .board
            .reading("oth.ed")
            .and_then(|r| r.value)
            .map(|v| format!("{v} kWh"))
            .unwrap_or_else(|| "unknown".into());
        info!(
            "{}: {} requests, {} messages, {} reconnect failures, {} readings known, energy today {}",
            health.name, health.requests_sent, health.messages_received, health.connect_failures, known, today
        );
    }

    Ok(())
}
