//! Upstream exchange stream client
//!
//! One connection per symbol, driven by an explicit reconnect state
//! machine. A receive error or dropped connection moves the symbol to
//! Retrying and backs off for a fixed interval; other symbols are
//! unaffected. Frames are parsed once at this boundary; everything
//! downstream sees typed ticks only.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use types::ids::Symbol;
use types::numeric::{Price, Quantity};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Fixed delay between reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Lifecycle of one symbol's upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff after a failure.
    Retrying,
}

/// Shared, observable connection state handle.
#[derive(Clone)]
pub struct StateHandle(Arc<Mutex<ConnectionState>>);

impl StateHandle {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(ConnectionState::Disconnected)))
    }

    pub fn get(&self) -> ConnectionState {
        *self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, state: ConnectionState) {
        *self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

/// A parsed upstream trade tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTick {
    pub symbol: Symbol,
    pub price: Price,
    pub quantity: Quantity,
    /// Exchange event time, Unix milliseconds.
    pub event_time: i64,
}

/// Raw trade frame as the exchange puts it on the wire.
#[derive(Debug, Deserialize)]
struct TickFrame {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "s")]
    #[allow(dead_code)]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    event_time: i64,
}

/// Build the subscription frame for a symbol's trade topic.
pub fn subscribe_frame(symbol: &Symbol, request_id: u64) -> String {
    json!({
        "method": "SUBSCRIBE",
        "params": [format!("{}@trade", symbol.stream_name())],
        "id": request_id,
    })
    .to_string()
}

/// Parse one text frame into a tick.
///
/// Acks and non-trade events are Ok(None); structurally broken frames
/// are errors for the caller to drop and log.
pub fn parse_tick(symbol: &Symbol, text: &str) -> Result<Option<TradeTick>, StreamError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| StreamError::Malformed(e.to_string()))?;

    // Subscription acks look like {"result": null, "id": 1}.
    if value.get("result").is_some() {
        return Ok(None);
    }

    let frame: TickFrame =
        serde_json::from_value(value).map_err(|e| StreamError::Malformed(e.to_string()))?;
    if frame.event != "trade" {
        return Ok(None);
    }

    let price = Price::from_str(&frame.price)
        .map_err(|e| StreamError::Malformed(e.to_string()))?;
    let quantity = Quantity::from_str(&frame.quantity)
        .map_err(|e| StreamError::Malformed(e.to_string()))?;

    Ok(Some(TradeTick {
        symbol: symbol.clone(),
        price,
        quantity,
        event_time: frame.event_time,
    }))
}

/// One symbol's upstream connection.
pub struct StreamConnection {
    endpoint: String,
    symbol: Symbol,
    state: StateHandle,
    backoff: Duration,
    next_request_id: u64,
}

impl StreamConnection {
    pub fn new(endpoint: impl Into<String>, symbol: Symbol) -> Self {
        Self {
            endpoint: endpoint.into(),
            symbol,
            state: StateHandle::new(),
            backoff: RECONNECT_BACKOFF,
            next_request_id: 1,
        }
    }

    /// Override the reconnect backoff (shortened in tests).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Observable connection state, cloneable across tasks.
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// One connection attempt: dial, then send the subscribe frame.
    ///
    /// Failure is logged and reported as None; the caller decides
    /// whether to back off and retry.
    async fn connect(&mut self) -> Option<WsStream> {
        self.state.set(ConnectionState::Connecting);
        let (mut ws, _) = match connect_async(&self.endpoint).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Stream connect failed");
                return None;
            }
        };

        let frame = subscribe_frame(&self.symbol, self.next_request_id);
        self.next_request_id += 1;
        if let Err(e) = ws.send(Message::Text(frame)).await {
            warn!(symbol = %self.symbol, error = %e, "Subscribe send failed");
            return None;
        }

        self.state.set(ConnectionState::Connected);
        info!(symbol = %self.symbol, endpoint = %self.endpoint, "Stream connected");
        Some(ws)
    }

    /// Drive the receive loop until the stop signal flips.
    ///
    /// Each iteration either forwards one tick in arrival order or
    /// handles a failure by backing off and reconnecting. Exits within
    /// one backoff interval of `stop`.
    pub async fn run(mut self, ticks: mpsc::Sender<TradeTick>, mut stop: watch::Receiver<bool>) {
        while !*stop.borrow() {
            let Some(mut ws) = self.connect().await else {
                if self.wait_backoff(&mut stop).await {
                    break;
                }
                continue;
            };

            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        // A dropped stop sender counts as a stop.
                        if changed.is_err() || *stop.borrow() {
                            let _ = ws.close(None).await;
                            self.state.set(ConnectionState::Disconnected);
                            return;
                        }
                    }
                    frame = ws.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match parse_tick(&self.symbol, &text) {
                                    Ok(Some(tick)) => {
                                        if ticks.send(tick).await.is_err() {
                                            // Pipeline gone; nothing left to feed.
                                            self.state.set(ConnectionState::Disconnected);
                                            return;
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(e) => {
                                        debug!(symbol = %self.symbol, error = %e, "Dropped malformed frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = ws.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(symbol = %self.symbol, error = %e, "Stream receive error");
                                break;
                            }
                            None => {
                                warn!(symbol = %self.symbol, "Stream closed by remote");
                                break;
                            }
                        }
                    }
                }
            }

            if self.wait_backoff(&mut stop).await {
                break;
            }
        }

        self.state.set(ConnectionState::Disconnected);
    }

    /// Back off before the next attempt. Returns true when stopped,
    /// including when the stop sender is gone.
    async fn wait_backoff(&self, stop: &mut watch::Receiver<bool>) -> bool {
        self.state.set(ConnectionState::Retrying);
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => false,
            changed = stop.changed() => changed.is_err() || *stop.borrow(),
        }
    }
}
