//! Market data types: trades and order-book snapshots
//!
//! Both are immutable once recorded. Trades live inside per-symbol
//! rolling windows; order-book snapshots are replaced wholesale on every
//! update (no incremental diffing).

use serde::{Deserialize, Serialize};

use crate::ids::Symbol;
use crate::numeric::{Price, Quantity};

/// A single executed trade as observed on the upstream stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Instrument this trade belongs to.
    pub symbol: Symbol,
    /// Execution price. Strictly positive.
    pub price: Price,
    /// Traded quantity. Non-negative.
    pub quantity: Quantity,
    /// Unix nanoseconds when the monitoring core received the trade.
    pub received_at: i64,
}

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub size: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price, size: Quantity) -> Self {
        Self { price, size }
    }
}

/// Full order-book snapshot for one symbol.
///
/// Bids and asks are ordered best-first. A new snapshot replaces the
/// previous one entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: Symbol,
    /// Bid levels in descending price order (best first).
    pub bids: Vec<PriceLevel>,
    /// Ask levels in ascending price order (best first).
    pub asks: Vec<PriceLevel>,
    /// Unix nanoseconds when the snapshot was received.
    pub received_at: i64,
}

impl OrderBookSnapshot {
    /// Best bid, if the bid side is non-empty.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask, if the ask side is non-empty.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Top-of-book spread, when both sides are present.
    pub fn spread(&self) -> Option<rust_decimal::Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                Some(ask.price.as_decimal() - bid.price.as_decimal())
            }
            _ => None,
        }
    }
}
