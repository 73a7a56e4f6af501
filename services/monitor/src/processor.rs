//! Per-symbol rolling market state
//!
//! Holds bounded trade windows and the latest order-book snapshot for
//! each symbol. Pure in-memory state with no I/O; the symbol's stream
//! pipeline is the only writer, every other component only reads.

use std::collections::BTreeMap;

use tracing::debug;
use types::ids::Symbol;
use types::market::{OrderBookSnapshot, PriceLevel, Trade};
use types::numeric::{Price, Quantity};

use crate::window::RollingWindow;

/// Default per-symbol trade window capacity.
pub const DEFAULT_TRADE_WINDOW: usize = 1000;

/// Bounded rolling state for all monitored symbols.
///
/// Uses BTreeMap for deterministic iteration when building snapshots.
pub struct DataProcessor {
    trades: BTreeMap<Symbol, RollingWindow<Trade>>,
    books: BTreeMap<Symbol, OrderBookSnapshot>,
    window_capacity: usize,
}

impl DataProcessor {
    /// Create a processor with the given per-symbol window capacity.
    pub fn new(window_capacity: usize) -> Self {
        Self {
            trades: BTreeMap::new(),
            books: BTreeMap::new(),
            window_capacity,
        }
    }

    /// Create a processor with the default window capacity (1000).
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TRADE_WINDOW)
    }

    /// Record a trade, creating the symbol's window on first use.
    pub fn process_trade(
        &mut self,
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        received_at: i64,
    ) {
        let capacity = self.window_capacity;
        let window = self
            .trades
            .entry(symbol.clone())
            .or_insert_with(|| RollingWindow::new(capacity));

        window.push(Trade {
            symbol,
            price,
            quantity,
            received_at,
        });
    }

    /// Replace the symbol's order-book snapshot wholesale.
    pub fn process_order_book(
        &mut self,
        symbol: Symbol,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        received_at: i64,
    ) {
        debug!(
            symbol = %symbol,
            bid_levels = bids.len(),
            ask_levels = asks.len(),
            "Order book snapshot replaced"
        );
        self.books.insert(
            symbol.clone(),
            OrderBookSnapshot {
                symbol,
                bids,
                asks,
                received_at,
            },
        );
    }

    /// Price of the most recent trade, or None before any data arrives.
    ///
    /// An explicit absent state rather than a 0.0 sentinel: zero is a
    /// legal price for nothing, so "no data yet" must be unambiguous.
    pub fn latest_price(&self, symbol: &Symbol) -> Option<Price> {
        self.trades
            .get(symbol)
            .and_then(|w| w.last())
            .map(|t| t.price)
    }

    /// The most recent `n` trades for a symbol, most-recent-last.
    pub fn price_history(&self, symbol: &Symbol, n: usize) -> Vec<Trade> {
        self.trades
            .get(symbol)
            .map(|w| w.last_n(n).cloned().collect())
            .unwrap_or_default()
    }

    /// Full trade window for a symbol, if any trades have been recorded.
    pub fn trade_window(&self, symbol: &Symbol) -> Option<&RollingWindow<Trade>> {
        self.trades.get(symbol)
    }

    /// Latest order-book snapshot for a symbol, if one has arrived.
    pub fn order_book(&self, symbol: &Symbol) -> Option<&OrderBookSnapshot> {
        self.books.get(symbol)
    }

    /// Number of trades recorded for a symbol (bounded by capacity).
    pub fn trade_count(&self, symbol: &Symbol) -> usize {
        self.trades.get(symbol).map(|w| w.len()).unwrap_or(0)
    }

    /// Symbols with at least one recorded trade, in deterministic order.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.trades.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    fn record(proc_: &mut DataProcessor, symbol: &str, price: u64, qty: u64, at: i64) {
        proc_.process_trade(
            sym(symbol),
            Price::from_u64(price),
            Quantity::from_u64(qty),
            at,
        );
    }

    #[test]
    fn test_latest_price_absent_before_data() {
        let proc_ = DataProcessor::with_defaults();
        assert_eq!(proc_.latest_price(&sym("BTC/USDT")), None);
    }

    #[test]
    fn test_latest_price_after_one_trade() {
        let mut proc_ = DataProcessor::with_defaults();
        record(&mut proc_, "BTC/USDT", 50000, 1, 1);

        assert_eq!(
            proc_.latest_price(&sym("BTC/USDT")),
            Some(Price::from_u64(50000))
        );
    }

    #[test]
    fn test_window_capacity_enforced() {
        let mut proc_ = DataProcessor::new(3);
        for i in 1..=5u64 {
            record(&mut proc_, "BTC/USDT", 50000 + i, 1, i as i64);
        }

        assert_eq!(proc_.trade_count(&sym("BTC/USDT")), 3);
        let history = proc_.price_history(&sym("BTC/USDT"), 10);
        // Oldest entries evicted; most-recent-last ordering
        assert_eq!(history[0].price, Price::from_u64(50003));
        assert_eq!(history[2].price, Price::from_u64(50005));
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut proc_ = DataProcessor::new(2);
        record(&mut proc_, "BTC/USDT", 50000, 1, 1);
        record(&mut proc_, "ETH/USDT", 3000, 1, 1);
        record(&mut proc_, "ETH/USDT", 3001, 1, 2);
        record(&mut proc_, "ETH/USDT", 3002, 1, 3);

        assert_eq!(proc_.trade_count(&sym("BTC/USDT")), 1);
        assert_eq!(proc_.trade_count(&sym("ETH/USDT")), 2);
        assert_eq!(
            proc_.latest_price(&sym("BTC/USDT")),
            Some(Price::from_u64(50000))
        );
    }

    #[test]
    fn test_order_book_replaced_wholesale() {
        let mut proc_ = DataProcessor::with_defaults();
        let symbol = sym("BTC/USDT");

        proc_.process_order_book(
            symbol.clone(),
            vec![PriceLevel::new(Price::from_u64(50000), Quantity::from_u64(2))],
            vec![PriceLevel::new(Price::from_u64(50010), Quantity::from_u64(1))],
            1,
        );
        proc_.process_order_book(
            symbol.clone(),
            vec![PriceLevel::new(Price::from_u64(49999), Quantity::from_u64(4))],
            vec![],
            2,
        );

        let book = proc_.order_book(&symbol).unwrap();
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids[0].price, Price::from_u64(49999));
        assert!(book.asks.is_empty());
        assert_eq!(book.received_at, 2);
    }

    #[test]
    fn test_price_history_before_data() {
        let proc_ = DataProcessor::with_defaults();
        assert!(proc_.price_history(&sym("BTC/USDT"), 5).is_empty());
    }
}
