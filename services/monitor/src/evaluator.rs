//! Threshold and trend rules over rolling trade windows
//!
//! Stateless: every call derives its verdict from the window contents
//! alone. Rules are evaluated independently and may all fire on the
//! same update.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use types::alert::{AlertEvent, AlertEvidence, AlertKind};
use types::ids::Symbol;
use types::market::Trade;
use types::numeric::decimal_mean;

use crate::window::RollingWindow;

/// Thresholds for the spike and trend rules.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Trades considered "previous" when checking the newest one.
    pub spike_lookback: usize,
    /// Price spike fires when the newest price exceeds the mean of the
    /// previous `spike_lookback` prices by more than this ratio.
    pub price_spike_ratio: Decimal,
    /// Volume spike fires when the newest quantity exceeds the mean of
    /// the previous `spike_lookback` quantities by more than this multiple.
    pub volume_spike_multiple: Decimal,
    /// Trades in the short trend window.
    pub trend_short: usize,
    /// Trades in the long trend window.
    pub trend_long: usize,
    /// Trend change fires when the short-window mean deviates from the
    /// long-window mean by more than this fraction.
    pub trend_deviation: Decimal,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            spike_lookback: 5,
            price_spike_ratio: dec!(0.02),
            volume_spike_multiple: dec!(3),
            trend_short: 5,
            trend_long: 20,
            trend_deviation: dec!(0.05),
        }
    }
}

/// Stateless alert condition evaluator.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    config: EvaluatorConfig,
}

impl AlertEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Evaluate all rules against the symbol's trade window.
    ///
    /// Fewer than `spike_lookback + 1` trades is not an error: there is
    /// simply nothing to compare yet and the result is empty.
    pub fn evaluate(&self, symbol: &Symbol, window: &RollingWindow<Trade>) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        if window.len() < self.config.spike_lookback + 1 {
            return alerts;
        }

        let recent: Vec<&Trade> = window.last_n(self.config.spike_lookback + 1).collect();
        let (previous, newest) = recent.split_at(self.config.spike_lookback);
        let newest = newest[0];

        if let Some(alert) = self.check_price_spike(symbol, previous, newest) {
            alerts.push(alert);
        }
        if let Some(alert) = self.check_volume_spike(symbol, previous, newest) {
            alerts.push(alert);
        }
        if let Some(alert) = self.check_trend_change(symbol, window) {
            alerts.push(alert);
        }

        alerts
    }

    fn check_price_spike(
        &self,
        symbol: &Symbol,
        previous: &[&Trade],
        newest: &Trade,
    ) -> Option<AlertEvent> {
        let prices: Vec<Decimal> = previous.iter().map(|t| t.price.as_decimal()).collect();
        let mean = decimal_mean(&prices)?;
        if mean <= Decimal::ZERO {
            return None;
        }

        let observed = newest.price.as_decimal() / mean - Decimal::ONE;
        if observed <= self.config.price_spike_ratio {
            return None;
        }

        Some(AlertEvent::new(
            symbol.clone(),
            AlertKind::PriceSpike,
            format!(
                "Price {} is {:.2}% above the rolling mean {}",
                newest.price,
                observed.to_f64().unwrap_or(0.0) * 100.0,
                mean,
            ),
            AlertEvidence {
                observed: observed.to_f64().unwrap_or(0.0),
                threshold: self.config.price_spike_ratio.to_f64().unwrap_or(0.0),
            },
        ))
    }

    fn check_volume_spike(
        &self,
        symbol: &Symbol,
        previous: &[&Trade],
        newest: &Trade,
    ) -> Option<AlertEvent> {
        let quantities: Vec<Decimal> =
            previous.iter().map(|t| t.quantity.as_decimal()).collect();
        let mean = decimal_mean(&quantities)?;
        // A flat-zero baseline has no meaningful multiple; skip rather
        // than divide by zero.
        if mean <= Decimal::ZERO {
            return None;
        }

        let observed = newest.quantity.as_decimal() / mean;
        if observed <= self.config.volume_spike_multiple {
            return None;
        }

        Some(AlertEvent::new(
            symbol.clone(),
            AlertKind::VolumeSpike,
            format!(
                "Quantity {} is {:.1}x the rolling mean {}",
                newest.quantity,
                observed.to_f64().unwrap_or(0.0),
                mean,
            ),
            AlertEvidence {
                observed: observed.to_f64().unwrap_or(0.0),
                threshold: self.config.volume_spike_multiple.to_f64().unwrap_or(0.0),
            },
        ))
    }

    fn check_trend_change(
        &self,
        symbol: &Symbol,
        window: &RollingWindow<Trade>,
    ) -> Option<AlertEvent> {
        if window.len() < self.config.trend_long {
            return None;
        }

        let long: Vec<Decimal> = window
            .last_n(self.config.trend_long)
            .map(|t| t.price.as_decimal())
            .collect();
        let short: Vec<Decimal> = window
            .last_n(self.config.trend_short)
            .map(|t| t.price.as_decimal())
            .collect();

        let long_mean = decimal_mean(&long)?;
        let short_mean = decimal_mean(&short)?;
        if long_mean <= Decimal::ZERO {
            return None;
        }

        let deviation = ((short_mean - long_mean) / long_mean).abs();
        if deviation <= self.config.trend_deviation {
            return None;
        }

        Some(AlertEvent::new(
            symbol.clone(),
            AlertKind::TrendChange,
            format!(
                "Short trend {} deviates {:.2}% from long trend {}",
                short_mean,
                deviation.to_f64().unwrap_or(0.0) * 100.0,
                long_mean,
            ),
            AlertEvidence {
                observed: deviation.to_f64().unwrap_or(0.0),
                threshold: self.config.trend_deviation.to_f64().unwrap_or(0.0),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::{Price, Quantity};

    fn sym() -> Symbol {
        Symbol::new("BTC/USDT")
    }

    fn trade(price: u64, qty: u64, at: i64) -> Trade {
        Trade {
            symbol: sym(),
            price: Price::from_u64(price),
            quantity: Quantity::from_u64(qty),
            received_at: at,
        }
    }

    fn window_of(trades: Vec<Trade>) -> RollingWindow<Trade> {
        let mut window = RollingWindow::new(100);
        for t in trades {
            window.push(t);
        }
        window
    }

    fn kinds(alerts: &[AlertEvent]) -> Vec<AlertKind> {
        alerts.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn test_too_few_trades_is_empty_not_error() {
        let evaluator = AlertEvaluator::default();
        let window = window_of(vec![trade(100, 1, 1), trade(100, 1, 2)]);

        assert!(evaluator.evaluate(&sym(), &window).is_empty());
    }

    #[test]
    fn test_price_spike_fires_above_threshold() {
        let evaluator = AlertEvaluator::default();
        // Five flat prices then a 3% jump: above the 2% default.
        let mut trades: Vec<Trade> =
            (0..5).map(|i| trade(100, 1, i)).collect();
        trades.push(trade(103, 1, 5));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        assert!(kinds(&alerts).contains(&AlertKind::PriceSpike));
    }

    #[test]
    fn test_price_spike_quiet_below_threshold() {
        let evaluator = AlertEvaluator::default();
        // 1% move: below the 2% default.
        let mut trades: Vec<Trade> =
            (0..5).map(|i| trade(100, 1, i)).collect();
        trades.push(trade(101, 1, 5));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        assert!(!kinds(&alerts).contains(&AlertKind::PriceSpike));
    }

    #[test]
    fn test_volume_spike_fires_at_four_times_mean() {
        let evaluator = AlertEvaluator::default();
        let mut trades: Vec<Trade> =
            (0..5).map(|i| trade(100, 1, i)).collect();
        trades.push(trade(100, 4, 5));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        assert!(kinds(&alerts).contains(&AlertKind::VolumeSpike));
    }

    #[test]
    fn test_volume_spike_quiet_at_double_mean() {
        let evaluator = AlertEvaluator::default();
        let mut trades: Vec<Trade> =
            (0..5).map(|i| trade(100, 1, i)).collect();
        trades.push(trade(100, 2, 5));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        assert!(!kinds(&alerts).contains(&AlertKind::VolumeSpike));
    }

    #[test]
    fn test_zero_volume_baseline_skipped() {
        let evaluator = AlertEvaluator::default();
        let mut trades: Vec<Trade> =
            (0..5).map(|i| trade(100, 0, i)).collect();
        trades.push(trade(100, 10, 5));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        assert!(!kinds(&alerts).contains(&AlertKind::VolumeSpike));
    }

    #[test]
    fn test_trend_change_fires_on_sustained_move() {
        let evaluator = AlertEvaluator::default();
        // Fifteen trades at 100, then five at 140: short mean 140 vs
        // long mean 110, a 27% deviation.
        let mut trades: Vec<Trade> =
            (0..15).map(|i| trade(100, 1, i)).collect();
        trades.extend((15..20).map(|i| trade(140, 1, i)));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        assert!(kinds(&alerts).contains(&AlertKind::TrendChange));
    }

    #[test]
    fn test_trend_quiet_on_flat_market() {
        let evaluator = AlertEvaluator::default();
        let trades: Vec<Trade> = (0..20).map(|i| trade(100, 1, i)).collect();

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        assert!(!kinds(&alerts).contains(&AlertKind::TrendChange));
    }

    #[test]
    fn test_rules_fire_independently() {
        let evaluator = AlertEvaluator::default();
        // Price and volume both spike on the newest trade.
        let mut trades: Vec<Trade> =
            (0..5).map(|i| trade(100, 1, i)).collect();
        trades.push(trade(110, 10, 5));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        let kinds = kinds(&alerts);
        assert!(kinds.contains(&AlertKind::PriceSpike));
        assert!(kinds.contains(&AlertKind::VolumeSpike));
    }

    #[test]
    fn test_evidence_carries_observed_ratio() {
        let evaluator = AlertEvaluator::default();
        let mut trades: Vec<Trade> =
            (0..5).map(|i| trade(100, 1, i)).collect();
        trades.push(trade(103, 1, 5));

        let alerts = evaluator.evaluate(&sym(), &window_of(trades));
        let spike = alerts
            .iter()
            .find(|a| a.kind == AlertKind::PriceSpike)
            .unwrap();
        assert!((spike.evidence.observed - 0.03).abs() < 1e-9);
        assert!((spike.evidence.threshold - 0.02).abs() < 1e-9);
    }
}
