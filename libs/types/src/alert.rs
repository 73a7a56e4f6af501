//! Alert event types
//!
//! An alert is created once by the evaluation or metrics path, recorded
//! in a bounded in-memory log, and fanned out to handlers. It is never
//! mutated after creation; "active" simply means recent enough to still
//! be in the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AlertId, Symbol};

/// Category of alert condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Latest price exceeds the rolling mean by more than the spike ratio.
    PriceSpike,
    /// Latest trade quantity exceeds the rolling mean by more than the
    /// spike multiple.
    VolumeSpike,
    /// Short-window trend deviates from the long-window trend.
    TrendChange,
    /// Model accuracy fell below the required threshold.
    Accuracy,
    /// Average prediction error exceeded the drift tolerance.
    Drift,
    /// Prediction confidence below the minimum.
    Confidence,
}

impl AlertKind {
    /// Stable label used in logs and outbound payloads.
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::PriceSpike => "PRICE_SPIKE",
            AlertKind::VolumeSpike => "VOLUME_SPIKE",
            AlertKind::TrendChange => "TREND_CHANGE",
            AlertKind::Accuracy => "ACCURACY",
            AlertKind::Drift => "DRIFT",
            AlertKind::Confidence => "CONFIDENCE",
        }
    }
}

/// Numeric evidence attached to an alert.
///
/// Values are dimensionless ratios (observed spike ratio, error mean,
/// confidence), so f64 is appropriate here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertEvidence {
    /// The observed value that violated the rule.
    pub observed: f64,
    /// The configured threshold it was compared against.
    pub threshold: f64,
}

/// An immutable alert event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unique, time-sortable identifier.
    pub id: AlertId,
    /// Instrument the alert refers to.
    pub symbol: Symbol,
    /// Alert category.
    pub kind: AlertKind,
    /// Human-readable description for notification channels.
    pub message: String,
    /// Creation time (wall clock, for persisted logs and payloads).
    pub created_at: DateTime<Utc>,
    /// Numeric evidence backing the alert.
    pub evidence: AlertEvidence,
}

impl AlertEvent {
    /// Create a new alert event timestamped now.
    pub fn new(
        symbol: Symbol,
        kind: AlertKind,
        message: impl Into<String>,
        evidence: AlertEvidence,
    ) -> Self {
        Self {
            id: AlertId::new(),
            symbol,
            kind,
            message: message.into(),
            created_at: Utc::now(),
            evidence,
        }
    }
}
