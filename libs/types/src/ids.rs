//! Identifier types for monitored entities
//!
//! Symbols are opaque, non-empty instrument identifiers and key all
//! per-symbol state. Alert IDs use UUID v7 for time-sortable ordering,
//! enabling chronological queries over persisted alert logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Identifier for a tradeable instrument (e.g. "BTC/USDT").
///
/// Opaque to the monitoring core: no format beyond non-emptiness is
/// assumed. Used as the key for all per-symbol rolling state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol from a string.
    ///
    /// # Panics
    /// Panics if the symbol is empty.
    pub fn new(symbol: impl Into<String>) -> Self {
        let s = symbol.into();
        assert!(!s.is_empty(), "Symbol must not be empty");
        Self(s)
    }

    /// Try to create a Symbol, rejecting empty input.
    pub fn try_new(symbol: impl Into<String>) -> Result<Self, ValidationError> {
        let s = symbol.into();
        if s.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        Ok(Self(s))
    }

    /// Get the symbol string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used in upstream stream topic names
    /// (e.g. "btcusdt@trade").
    pub fn stream_name(&self) -> String {
        self.0.to_lowercase().replace('/', "")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for an alert event
///
/// Uses UUID v7 so persisted alert logs sort chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Create a new AlertId with current timestamp
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_creation() {
        let sym = Symbol::new("BTC/USDT");
        assert_eq!(sym.as_str(), "BTC/USDT");
    }

    #[test]
    fn test_symbol_rejects_empty() {
        assert_eq!(Symbol::try_new(""), Err(ValidationError::EmptySymbol));
        assert!(Symbol::try_new("ETH/USDT").is_ok());
    }

    #[test]
    fn test_symbol_stream_name() {
        assert_eq!(Symbol::new("BTC/USDT").stream_name(), "btcusdt");
        assert_eq!(Symbol::new("BTCUSDT").stream_name(), "btcusdt");
    }

    #[test]
    fn test_symbol_serialization() {
        let sym = Symbol::new("BTC/USDT");
        let json = serde_json::to_string(&sym).unwrap();
        assert_eq!(json, "\"BTC/USDT\"");
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(sym, back);
    }

    #[test]
    fn test_alert_id_uniqueness() {
        let id1 = AlertId::new();
        let id2 = AlertId::new();
        assert_ne!(id1, id2, "AlertIds should be unique");
    }

    #[test]
    fn test_alert_id_serialization() {
        let id = AlertId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: AlertId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
