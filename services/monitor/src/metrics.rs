//! Prediction accuracy and model drift tracking
//!
//! Runs beside the streaming path: consumes prediction-engine output,
//! accumulates per-symbol error history in bounded windows, and derives
//! drift and performance figures on demand. Values here are
//! dimensionless ratios, so f64 is used throughout.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use types::ids::Symbol;

use crate::window::RollingWindow;

/// Default cap on per-symbol accuracy sample windows.
pub const DEFAULT_ACCURACY_WINDOW: usize = 100;

/// Configuration for the metrics tracker.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Accuracy samples kept per symbol.
    pub accuracy_window: usize,
    /// Mean relative error above which drift is flagged.
    pub drift_threshold: f64,
    /// Predictions kept in the bookkeeping log.
    pub prediction_log: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            accuracy_window: DEFAULT_ACCURACY_WINDOW,
            drift_threshold: 0.05,
            prediction_log: 1000,
        }
    }
}

/// One prediction-vs-actual comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySample {
    pub actual: f64,
    pub predicted: f64,
    /// Relative error |actual - predicted| / |actual|.
    pub error: f64,
    pub timestamp: DateTime<Utc>,
}

impl AccuracySample {
    /// Build a sample, refusing a zero actual (the relative error would
    /// be undefined).
    pub fn try_new(actual: f64, predicted: f64) -> Option<Self> {
        if actual == 0.0 || !actual.is_finite() || !predicted.is_finite() {
            return None;
        }
        Some(Self {
            actual,
            predicted,
            error: (actual - predicted).abs() / actual.abs(),
            timestamp: Utc::now(),
        })
    }
}

/// Drift verdict derived from the current sample window.
///
/// Always recomputed from the window, never maintained incrementally:
/// the same window contents always yield the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftState {
    pub symbol: Symbol,
    pub average_error: f64,
    pub drift_detected: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate model performance over the recent sample window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    /// 1 - mean relative error. May legitimately be negative when the
    /// mean error exceeds 1; surfaced as-is so alerting can react.
    pub current_accuracy: f64,
    pub error_std: f64,
    pub min_error: f64,
    pub max_error: f64,
    pub sample_count: usize,
}

/// Pass-through record of a prediction, for later reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub symbol: Symbol,
    pub predicted: f64,
    pub confidence: f64,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
}

/// Latest feature-importance weights reported for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub weights: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// Serializable view of the tracker state for periodic persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub accuracy: BTreeMap<Symbol, Vec<AccuracySample>>,
    pub drift: BTreeMap<Symbol, DriftState>,
    pub predictions: Vec<PredictionRecord>,
    pub feature_importance: BTreeMap<Symbol, FeatureImportance>,
}

/// Accumulates prediction-vs-actual history and derives drift/accuracy.
pub struct MetricsTracker {
    accuracy: BTreeMap<Symbol, RollingWindow<AccuracySample>>,
    drift: BTreeMap<Symbol, DriftState>,
    predictions: RollingWindow<PredictionRecord>,
    feature_importance: BTreeMap<Symbol, FeatureImportance>,
    config: MetricsConfig,
}

impl MetricsTracker {
    pub fn new(config: MetricsConfig) -> Self {
        let prediction_log = config.prediction_log;
        Self {
            accuracy: BTreeMap::new(),
            drift: BTreeMap::new(),
            predictions: RollingWindow::new(prediction_log),
            feature_importance: BTreeMap::new(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MetricsConfig::default())
    }

    /// Record a prediction-vs-actual pair for a symbol.
    ///
    /// Returns false (and logs) when the sample is rejected because the
    /// actual value is zero or non-finite; processing continues.
    pub fn update_accuracy(&mut self, symbol: &Symbol, actual: f64, predicted: f64) -> bool {
        let Some(sample) = AccuracySample::try_new(actual, predicted) else {
            warn!(
                symbol = %symbol,
                actual,
                predicted,
                "Dropping accuracy sample with undefined relative error"
            );
            return false;
        };

        debug!(symbol = %symbol, error = sample.error, "Accuracy sample recorded");

        let capacity = self.config.accuracy_window;
        self.accuracy
            .entry(symbol.clone())
            .or_insert_with(|| RollingWindow::new(capacity))
            .push(sample);
        true
    }

    /// Recompute the drift state from the current sample window.
    ///
    /// None when no samples have been recorded for the symbol.
    pub fn check_drift(&mut self, symbol: &Symbol) -> Option<DriftState> {
        let window = self.accuracy.get(symbol)?;
        if window.is_empty() {
            return None;
        }

        let errors: Vec<f64> = window.iter().map(|s| s.error).collect();
        let average_error = errors.iter().sum::<f64>() / errors.len() as f64;

        let state = DriftState {
            symbol: symbol.clone(),
            average_error,
            drift_detected: average_error > self.config.drift_threshold,
            timestamp: Utc::now(),
        };
        self.drift.insert(symbol.clone(), state.clone());
        Some(state)
    }

    /// Aggregate performance over the recent sample window.
    pub fn performance(&self, symbol: &Symbol) -> Option<ModelPerformance> {
        let window = self.accuracy.get(symbol)?;
        if window.is_empty() {
            return None;
        }

        let errors: Vec<f64> = window.iter().map(|s| s.error).collect();
        let count = errors.len();
        let mean = errors.iter().sum::<f64>() / count as f64;
        let variance =
            errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / count as f64;

        Some(ModelPerformance {
            current_accuracy: 1.0 - mean,
            error_std: variance.sqrt(),
            min_error: errors.iter().copied().fold(f64::INFINITY, f64::min),
            max_error: errors.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            sample_count: count,
        })
    }

    /// Bookkeeping: store a prediction for later reporting.
    pub fn record_prediction(
        &mut self,
        symbol: &Symbol,
        predicted: f64,
        confidence: f64,
        model_version: impl Into<String>,
    ) {
        self.predictions.push(PredictionRecord {
            symbol: symbol.clone(),
            predicted,
            confidence,
            model_version: model_version.into(),
            timestamp: Utc::now(),
        });
    }

    /// Bookkeeping: store the latest feature-importance weights.
    pub fn record_feature_importance(
        &mut self,
        symbol: &Symbol,
        weights: BTreeMap<String, f64>,
    ) {
        self.feature_importance.insert(
            symbol.clone(),
            FeatureImportance {
                weights,
                timestamp: Utc::now(),
            },
        );
    }

    /// Symbols with at least one accuracy sample, in deterministic order.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.accuracy.keys().cloned().collect()
    }

    /// Number of samples currently held for a symbol.
    pub fn sample_count(&self, symbol: &Symbol) -> usize {
        self.accuracy.get(symbol).map(|w| w.len()).unwrap_or(0)
    }

    /// Serializable copy of the full tracker state.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accuracy: self
                .accuracy
                .iter()
                .map(|(sym, w)| (sym.clone(), w.iter().cloned().collect()))
                .collect(),
            drift: self.drift.clone(),
            predictions: self.predictions.iter().cloned().collect(),
            feature_importance: self.feature_importance.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        Symbol::new("BTC/USDT")
    }

    #[test]
    fn test_zero_actual_sample_skipped() {
        let mut tracker = MetricsTracker::with_defaults();
        assert!(!tracker.update_accuracy(&sym(), 0.0, 100.0));
        assert_eq!(tracker.sample_count(&sym()), 0);
    }

    #[test]
    fn test_relative_error_computation() {
        let sample = AccuracySample::try_new(100.0, 95.0).unwrap();
        assert!((sample.error - 0.05).abs() < 1e-12);

        // Negative actuals are legal; the error uses magnitudes.
        let sample = AccuracySample::try_new(-100.0, -90.0).unwrap();
        assert!((sample.error - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_drift_detection_over_threshold() {
        let mut tracker = MetricsTracker::with_defaults();
        // 10% error on every sample: over the 5% default tolerance.
        for _ in 0..10 {
            tracker.update_accuracy(&sym(), 100.0, 110.0);
        }

        let state = tracker.check_drift(&sym()).unwrap();
        assert!(state.drift_detected);
        assert!((state.average_error - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_no_drift_under_threshold() {
        let mut tracker = MetricsTracker::with_defaults();
        for _ in 0..10 {
            tracker.update_accuracy(&sym(), 100.0, 101.0);
        }

        let state = tracker.check_drift(&sym()).unwrap();
        assert!(!state.drift_detected);
    }

    #[test]
    fn test_drift_is_idempotent_for_same_window() {
        let mut tracker = MetricsTracker::with_defaults();
        tracker.update_accuracy(&sym(), 100.0, 90.0);

        let first = tracker.check_drift(&sym()).unwrap();
        let second = tracker.check_drift(&sym()).unwrap();
        assert_eq!(first.average_error, second.average_error);
        assert_eq!(first.drift_detected, second.drift_detected);
    }

    #[test]
    fn test_drift_none_without_samples() {
        let mut tracker = MetricsTracker::with_defaults();
        assert!(tracker.check_drift(&sym()).is_none());
    }

    #[test]
    fn test_performance_statistics() {
        let mut tracker = MetricsTracker::with_defaults();
        tracker.update_accuracy(&sym(), 100.0, 98.0); // error 0.02
        tracker.update_accuracy(&sym(), 100.0, 96.0); // error 0.04

        let perf = tracker.performance(&sym()).unwrap();
        assert_eq!(perf.sample_count, 2);
        assert!((perf.current_accuracy - 0.97).abs() < 1e-12);
        assert!((perf.min_error - 0.02).abs() < 1e-12);
        assert!((perf.max_error - 0.04).abs() < 1e-12);
        assert!((perf.error_std - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_may_go_negative_unclamped() {
        let mut tracker = MetricsTracker::with_defaults();
        // 200% error: accuracy = 1 - 2 = -1, surfaced as-is.
        tracker.update_accuracy(&sym(), 100.0, 300.0);

        let perf = tracker.performance(&sym()).unwrap();
        assert!((perf.current_accuracy + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_performance_none_without_samples() {
        let tracker = MetricsTracker::with_defaults();
        assert!(tracker.performance(&sym()).is_none());
    }

    #[test]
    fn test_sample_window_capped() {
        let mut tracker = MetricsTracker::new(MetricsConfig {
            accuracy_window: 100,
            ..MetricsConfig::default()
        });
        for i in 0..150 {
            tracker.update_accuracy(&sym(), 100.0, 100.0 + i as f64 / 100.0);
        }
        assert_eq!(tracker.sample_count(&sym()), 100);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut tracker = MetricsTracker::with_defaults();
        tracker.update_accuracy(&sym(), 100.0, 99.0);
        tracker.record_prediction(&sym(), 101.0, 0.9, "1.0.0");
        tracker.record_feature_importance(
            &sym(),
            BTreeMap::from([("rsi".to_string(), 0.4)]),
        );
        tracker.check_drift(&sym());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.accuracy.get(&sym()).unwrap().len(), 1);
        assert_eq!(snapshot.predictions.len(), 1);
        assert!(snapshot.drift.contains_key(&sym()));
        assert!(snapshot.feature_importance.contains_key(&sym()));

        // Snapshot round-trips through JSON for persistence.
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }
}
