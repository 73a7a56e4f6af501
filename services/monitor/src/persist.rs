//! Timestamped alert and metrics dumps
//!
//! Point-in-time JSON files named by wall-clock minute, written by a
//! periodic task. Load counterparts exist for offline report tooling.
//! A failed dump is logged and retried on the next tick; it never
//! disturbs the streaming path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use types::alert::AlertEvent;

use crate::alerts::{AlertRouter, MAX_ACTIVE_ALERTS};
use crate::metrics::{MetricsSnapshot, MetricsTracker};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn timestamped_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.json", prefix, at.format("%Y%m%d_%H%M"))
}

/// Dump the alert log to `alerts_YYYYMMDD_HHMM.json` in `dir`.
pub fn save_alerts(
    dir: &Path,
    alerts: &[AlertEvent],
    at: DateTime<Utc>,
) -> Result<PathBuf, PersistError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(timestamped_name("alerts", at));
    fs::write(&path, serde_json::to_string_pretty(alerts)?)?;
    info!(path = %path.display(), count = alerts.len(), "Alert log persisted");
    Ok(path)
}

/// Load a previously dumped alert log.
pub fn load_alerts(path: &Path) -> Result<Vec<AlertEvent>, PersistError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Dump a metrics snapshot to `metrics_YYYYMMDD_HHMM.json` in `dir`.
pub fn save_metrics(
    dir: &Path,
    snapshot: &MetricsSnapshot,
    at: DateTime<Utc>,
) -> Result<PathBuf, PersistError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(timestamped_name("metrics", at));
    fs::write(&path, serde_json::to_string_pretty(snapshot)?)?;
    info!(path = %path.display(), "Metrics snapshot persisted");
    Ok(path)
}

/// Load a previously dumped metrics snapshot.
pub fn load_metrics(path: &Path) -> Result<MetricsSnapshot, PersistError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Periodic persister loop. Dumps the alert log and metrics snapshot
/// every `interval` until the stop signal flips.
pub async fn run_persister(
    alerts_dir: PathBuf,
    metrics_dir: PathBuf,
    router: Arc<AlertRouter>,
    tracker: Arc<Mutex<MetricsTracker>>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so dumps start one
    // interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                let alerts = router.active_alerts(MAX_ACTIVE_ALERTS);
                if let Err(e) = save_alerts(&alerts_dir, &alerts, now) {
                    warn!(error = %e, "Alert dump failed");
                }

                let snapshot = tracker
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .snapshot();
                if let Err(e) = save_metrics(&metrics_dir, &snapshot, now) {
                    warn!(error = %e, "Metrics dump failed");
                }
            }
            changed = stop.changed() => {
                // A dropped stop sender counts as a stop.
                if changed.is_err() || *stop.borrow() {
                    info!("Persister stopping");
                    return;
                }
            }
        }
    }
}
