//! Alert recording and dispatch
//!
//! The router owns the bounded in-memory alert log shared by the
//! streaming and metrics paths, applies the optional per-(symbol, kind)
//! cool-down, and fans every recorded alert out to the registered
//! handlers. A handler failure is logged and never prevents other
//! handlers from running or the alert from being recorded.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use types::alert::{AlertEvent, AlertEvidence, AlertKind};
use types::ids::Symbol;

use crate::notify::NotifyError;

/// Alerts kept in the in-memory log. "Active" means within this bound;
/// there is no separate acknowledgement or resolution state.
pub const MAX_ACTIVE_ALERTS: usize = 100;

/// Outbound dispatch target for recorded alerts.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Name used in dispatch-failure logs.
    fn name(&self) -> &str;

    /// Deliver one alert. Errors are caught at the dispatch boundary.
    async fn deliver(&self, alert: &AlertEvent) -> Result<(), NotifyError>;
}

/// Model-quality thresholds checked by the router.
#[derive(Debug, Clone, Copy)]
pub struct AlertThresholds {
    /// Accuracy below this fires an ACCURACY alert.
    pub min_accuracy: f64,
    /// Mean error above this fires a DRIFT alert.
    pub max_drift: f64,
    /// Confidence below this fires a CONFIDENCE alert.
    pub min_confidence: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_accuracy: 0.95,
            max_drift: 0.05,
            min_confidence: 0.8,
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    pub thresholds: AlertThresholds,
    /// Minimum interval between repeated alerts of the same
    /// (symbol, kind). None disables the cool-down entirely.
    pub cooldown: Option<Duration>,
}

struct RouterState {
    log: VecDeque<AlertEvent>,
    last_fired: BTreeMap<(Symbol, AlertKind), DateTime<Utc>>,
    suppressed: u64,
}

/// Records alerts and dispatches them to registered handlers.
pub struct AlertRouter {
    config: RouterConfig,
    state: Mutex<RouterState>,
    handlers: Vec<Box<dyn AlertHandler>>,
}

impl AlertRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RouterState {
                log: VecDeque::with_capacity(MAX_ACTIVE_ALERTS),
                last_fired: BTreeMap::new(),
                suppressed: 0,
            }),
            handlers: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RouterConfig::default())
    }

    /// Register a dispatch target. Called during bootstrap, before the
    /// router is shared across tasks.
    pub fn add_handler(&mut self, handler: Box<dyn AlertHandler>) {
        self.handlers.push(handler);
    }

    /// Single creation path: build an alert and record it.
    ///
    /// Returns the alert, or None when the cool-down suppressed it.
    pub async fn create_alert(
        &self,
        symbol: Symbol,
        kind: AlertKind,
        message: impl Into<String>,
        evidence: AlertEvidence,
    ) -> Option<AlertEvent> {
        let alert = AlertEvent::new(symbol, kind, message, evidence);
        if self.record(alert.clone()).await {
            Some(alert)
        } else {
            None
        }
    }

    /// Record an already-constructed alert (e.g. from the evaluator).
    ///
    /// Appends to the bounded log and dispatches to every handler
    /// before returning. Returns false when suppressed by cool-down.
    pub async fn record(&self, alert: AlertEvent) -> bool {
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if let Some(cooldown) = self.config.cooldown {
                let key = (alert.symbol.clone(), alert.kind);
                if let Some(last) = state.last_fired.get(&key) {
                    let elapsed = (alert.created_at - *last)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if elapsed < cooldown {
                        state.suppressed += 1;
                        info!(
                            symbol = %alert.symbol,
                            kind = alert.kind.label(),
                            suppressed_total = state.suppressed,
                            "Alert suppressed by cool-down"
                        );
                        return false;
                    }
                }
                state.last_fired.insert(key, alert.created_at);
            }

            if state.log.len() >= MAX_ACTIVE_ALERTS {
                state.log.pop_front();
            }
            state.log.push_back(alert.clone());
        }

        info!(
            symbol = %alert.symbol,
            kind = alert.kind.label(),
            message = %alert.message,
            "Alert recorded"
        );

        // Dispatch outside the lock; a failing handler never stops the
        // others or unwinds into the caller.
        for handler in &self.handlers {
            if let Err(e) = handler.deliver(&alert).await {
                warn!(
                    handler = handler.name(),
                    symbol = %alert.symbol,
                    kind = alert.kind.label(),
                    error = %e,
                    "Alert handler failed"
                );
            }
        }

        true
    }

    /// ACCURACY check: fires when accuracy falls below the threshold.
    pub async fn check_accuracy(&self, symbol: &Symbol, accuracy: f64) -> bool {
        let threshold = self.config.thresholds.min_accuracy;
        if accuracy >= threshold {
            return false;
        }
        self.create_alert(
            symbol.clone(),
            AlertKind::Accuracy,
            format!("Model accuracy below threshold: {:.2}%", accuracy * 100.0),
            AlertEvidence {
                observed: accuracy,
                threshold,
            },
        )
        .await;
        true
    }

    /// DRIFT check: fires when the mean error exceeds the tolerance.
    pub async fn check_drift(&self, symbol: &Symbol, drift: f64) -> bool {
        let threshold = self.config.thresholds.max_drift;
        if drift <= threshold {
            return false;
        }
        self.create_alert(
            symbol.clone(),
            AlertKind::Drift,
            format!("Model drift detected: {:.2}%", drift * 100.0),
            AlertEvidence {
                observed: drift,
                threshold,
            },
        )
        .await;
        true
    }

    /// CONFIDENCE check: fires when prediction confidence is too low.
    pub async fn check_confidence(&self, symbol: &Symbol, confidence: f64) -> bool {
        let threshold = self.config.thresholds.min_confidence;
        if confidence >= threshold {
            return false;
        }
        self.create_alert(
            symbol.clone(),
            AlertKind::Confidence,
            format!("Low prediction confidence: {:.2}%", confidence * 100.0),
            AlertEvidence {
                observed: confidence,
                threshold,
            },
        )
        .await;
        true
    }

    /// The most recent `limit` alerts, in creation order.
    pub fn active_alerts(&self, limit: usize) -> Vec<AlertEvent> {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let skip = state.log.len().saturating_sub(limit);
        state.log.iter().skip(skip).cloned().collect()
    }

    /// Alerts suppressed by the cool-down since startup.
    pub fn suppressed_count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .suppressed
    }
}
