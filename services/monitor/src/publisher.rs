//! Periodic snapshot publisher
//!
//! A low-frequency loop that derives market, technical and performance
//! snapshots from the current rolling state and publishes them to the
//! matching hub channels. Snapshot building is split out as pure
//! functions over the state so it can be tested without the loop.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info};
use types::numeric::decimal_mean;

use crate::hub::{BroadcastHub, Channel};
use crate::messages::{MarketEntry, PerformanceEntry, ServerMessage, TechnicalEntry};
use crate::metrics::MetricsTracker;
use crate::processor::DataProcessor;

/// Default publish interval.
pub const PUBLISH_INTERVAL: Duration = Duration::from_secs(60);

/// Trades considered when deriving technical statistics.
const TECHNICAL_LOOKBACK: usize = 20;

/// One market line per symbol with at least one trade.
pub fn build_market_snapshot(processor: &DataProcessor) -> Vec<MarketEntry> {
    processor
        .symbols()
        .into_iter()
        .filter_map(|symbol| {
            let price = processor.latest_price(&symbol)?;
            let book = processor.order_book(&symbol);
            Some(MarketEntry {
                trade_count: processor.trade_count(&symbol),
                best_bid: book.and_then(|b| b.best_bid()).map(|l| l.price),
                best_ask: book.and_then(|b| b.best_ask()).map(|l| l.price),
                symbol,
                price,
            })
        })
        .collect()
}

/// Mean/high/low over each symbol's recent trades.
pub fn build_technical_snapshot(processor: &DataProcessor) -> Vec<TechnicalEntry> {
    processor
        .symbols()
        .into_iter()
        .filter_map(|symbol| {
            let recent = processor.price_history(&symbol, TECHNICAL_LOOKBACK);
            let prices: Vec<Decimal> = recent.iter().map(|t| t.price.as_decimal()).collect();
            let mean_price = decimal_mean(&prices)?;
            let high = recent.iter().map(|t| t.price).max()?;
            let low = recent.iter().map(|t| t.price).min()?;
            Some(TechnicalEntry {
                symbol,
                mean_price,
                high,
                low,
            })
        })
        .collect()
}

/// Accuracy and drift per symbol with recorded samples.
pub fn build_performance_snapshot(tracker: &mut MetricsTracker) -> Vec<PerformanceEntry> {
    tracker
        .symbols()
        .into_iter()
        .filter_map(|symbol| {
            let performance = tracker.performance(&symbol)?;
            let drift_detected = tracker
                .check_drift(&symbol)
                .map(|d| d.drift_detected)
                .unwrap_or(false);
            Some(PerformanceEntry {
                symbol,
                performance,
                drift_detected,
            })
        })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Publisher loop: every `interval`, snapshot the state and publish
/// non-empty snapshots to their channels. Exits promptly on stop.
pub async fn run_publisher(
    processor: Arc<Mutex<DataProcessor>>,
    tracker: Arc<Mutex<MetricsTracker>>,
    hub: Arc<BroadcastHub>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (market, technical) = {
                    let processor = lock(&processor);
                    (
                        build_market_snapshot(&processor),
                        build_technical_snapshot(&processor),
                    )
                };
                let performance = build_performance_snapshot(&mut lock(&tracker));

                if !market.is_empty() {
                    let n = hub.publish(Channel::Market, ServerMessage::market(market));
                    debug!(delivered = n, "Market snapshot published");
                }
                if !technical.is_empty() {
                    hub.publish(Channel::Technical, ServerMessage::technical(technical));
                }
                if !performance.is_empty() {
                    hub.publish(Channel::Performance, ServerMessage::performance(performance));
                }
            }
            changed = stop.changed() => {
                // A dropped stop sender counts as a stop.
                if changed.is_err() || *stop.borrow() {
                    info!("Publisher stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::ids::Symbol;
    use types::market::PriceLevel;
    use types::numeric::{Price, Quantity};

    fn sym() -> Symbol {
        Symbol::new("BTC/USDT")
    }

    fn feed_trades(processor: &mut DataProcessor, prices: &[u64]) {
        for (i, p) in prices.iter().enumerate() {
            processor.process_trade(sym(), Price::from_u64(*p), Quantity::from_u64(1), i as i64);
        }
    }

    #[test]
    fn test_market_snapshot_empty_without_trades() {
        let processor = DataProcessor::with_defaults();
        assert!(build_market_snapshot(&processor).is_empty());
    }

    #[test]
    fn test_market_snapshot_carries_book_top() {
        let mut processor = DataProcessor::with_defaults();
        feed_trades(&mut processor, &[50000, 50010]);
        processor.process_order_book(
            sym(),
            vec![PriceLevel::new(Price::from_u64(50005), Quantity::from_u64(2))],
            vec![PriceLevel::new(Price::from_u64(50015), Quantity::from_u64(1))],
            3,
        );

        let snapshot = build_market_snapshot(&processor);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].price, Price::from_u64(50010));
        assert_eq!(snapshot[0].trade_count, 2);
        assert_eq!(snapshot[0].best_bid, Some(Price::from_u64(50005)));
        assert_eq!(snapshot[0].best_ask, Some(Price::from_u64(50015)));
    }

    #[test]
    fn test_technical_snapshot_statistics() {
        let mut processor = DataProcessor::with_defaults();
        feed_trades(&mut processor, &[100, 200, 300]);

        let snapshot = build_technical_snapshot(&processor);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].mean_price, dec!(200));
        assert_eq!(snapshot[0].high, Price::from_u64(300));
        assert_eq!(snapshot[0].low, Price::from_u64(100));
    }

    #[test]
    fn test_performance_snapshot_flags_drift() {
        let mut tracker = MetricsTracker::with_defaults();
        for _ in 0..5 {
            tracker.update_accuracy(&sym(), 100.0, 110.0);
        }

        let snapshot = build_performance_snapshot(&mut tracker);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].drift_detected);
        assert!((snapshot[0].performance.current_accuracy - 0.9).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publisher_publishes_on_tick_and_stops() {
        let mut processor = DataProcessor::with_defaults();
        feed_trades(&mut processor, &[100, 101]);
        let processor = Arc::new(Mutex::new(processor));
        let tracker = Arc::new(Mutex::new(MetricsTracker::with_defaults()));
        let hub = Arc::new(BroadcastHub::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let (client, mut rx) = hub.connect();
        hub.subscribe(client, Channel::Market).unwrap();

        let task = tokio::spawn(run_publisher(
            processor,
            tracker,
            hub.clone(),
            Duration::from_secs(1),
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, ServerMessage::Market { .. }));

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_publisher_exits_when_stop_sender_dropped() {
        let processor = Arc::new(Mutex::new(DataProcessor::with_defaults()));
        let tracker = Arc::new(Mutex::new(MetricsTracker::with_defaults()));
        let hub = Arc::new(BroadcastHub::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_publisher(
            processor,
            tracker,
            hub,
            Duration::from_secs(60),
            stop_rx,
        ));
        drop(stop_tx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("publisher must exit once the stop sender is gone")
            .unwrap();
    }
}
