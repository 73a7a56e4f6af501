//! Tagged wire messages for the subscriber surface
//!
//! Client frames are decoded once at the socket boundary into these
//! types; nothing downstream ever re-inspects raw JSON. Server frames
//! carry a `type` tag so browser clients can switch on it directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::alert::AlertEvent;
use types::ids::Symbol;
use types::numeric::Price;

use crate::hub::Channel;
use crate::metrics::ModelPerformance;

/// Inbound control frame from a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a channel; while already subscribed this is a
    /// channel change, not a second registration.
    Subscribe { channel: Channel },
    /// Leave the current channel but keep the socket open.
    Unsubscribe,
    /// Liveness probe, answered immediately.
    Heartbeat,
}

/// One symbol's market snapshot line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    pub symbol: Symbol,
    pub price: Price,
    pub trade_count: usize,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
}

/// One symbol's derived statistics line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalEntry {
    pub symbol: Symbol,
    /// Mean price over the recent window.
    pub mean_price: Decimal,
    pub high: Price,
    pub low: Price,
}

/// One symbol's model performance line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub performance: ModelPerformance,
    pub drift_detected: bool,
}

/// Outbound frame to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Market {
        data: Vec<MarketEntry>,
        timestamp: DateTime<Utc>,
    },
    Technical {
        data: Vec<TechnicalEntry>,
        timestamp: DateTime<Utc>,
    },
    Performance {
        data: Vec<PerformanceEntry>,
        timestamp: DateTime<Utc>,
    },
    Alert {
        data: AlertEvent,
        timestamp: DateTime<Utc>,
    },
    HeartbeatOk {
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn market(data: Vec<MarketEntry>) -> Self {
        Self::Market {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn technical(data: Vec<TechnicalEntry>) -> Self {
        Self::Technical {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn performance(data: Vec<PerformanceEntry>) -> Self {
        Self::Performance {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn alert(data: AlertEvent) -> Self {
        Self::Alert {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat_ok() -> Self {
        Self::HeartbeatOk {
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::alert::{AlertEvidence, AlertKind};

    #[test]
    fn test_subscribe_frame_decodes() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "subscribe", "channel": "market"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                channel: Channel::Market
            }
        );
    }

    #[test]
    fn test_heartbeat_frame_decodes() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "heartbeat"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Heartbeat);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type": "teleport", "channel": "market"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type": "subscribe", "channel": "weather"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_heartbeat_ok_wire_tag() {
        let json = serde_json::to_string(&ServerMessage::heartbeat_ok()).unwrap();
        assert!(json.contains(r#""type":"heartbeat_ok""#));
    }

    #[test]
    fn test_alert_frame_roundtrip() {
        let alert = AlertEvent::new(
            Symbol::new("BTC/USDT"),
            AlertKind::PriceSpike,
            "spike",
            AlertEvidence {
                observed: 0.03,
                threshold: 0.02,
            },
        );
        let msg = ServerMessage::alert(alert);
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
