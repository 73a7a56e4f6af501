//! Subscriber surface: WebSocket bridge and read endpoints
//!
//! The socket handler owns one hub client per connection and bridges
//! both directions: inbound frames are decoded once into typed control
//! messages, outbound hub messages are serialized onto the socket.
//! Read endpoints expose the alert log and per-symbol model metrics.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use types::ids::Symbol;

use crate::alerts::AlertRouter;
use crate::hub::{BroadcastHub, ClientId};
use crate::messages::{ClientMessage, ServerMessage};
use crate::metrics::MetricsTracker;

/// Shared handles the endpoints read from.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub router: Arc<AlertRouter>,
    pub tracker: Arc<Mutex<MetricsTracker>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/alerts", get(alerts))
        .route("/metrics/:symbol", get(symbol_metrics))
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the stop signal flips.
pub async fn serve(
    addr: std::net::SocketAddr,
    state: AppState,
    mut stop: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Subscriber surface listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            while stop.changed().await.is_ok() {
                if *stop.borrow() {
                    break;
                }
            }
        })
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

async fn alerts(State(state): State<AppState>, Query(query): Query<AlertsQuery>) -> Response {
    let limit = query.limit.unwrap_or(crate::alerts::MAX_ACTIVE_ALERTS);
    Json(state.router.active_alerts(limit)).into_response()
}

async fn symbol_metrics(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Response {
    let Ok(symbol) = Symbol::try_new(symbol) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let mut tracker = lock(&state.tracker);
    let Some(performance) = tracker.performance(&symbol) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no metrics recorded for symbol"})),
        )
            .into_response();
    };
    let drift = tracker.check_drift(&symbol);

    Json(json!({
        "symbol": symbol,
        "performance": performance,
        "drift": drift,
    }))
    .into_response()
}

async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| subscriber_session(state, socket))
}

/// Apply one decoded control frame. A heartbeat yields an immediate
/// reply for the socket; subscription changes act on the hub only.
fn handle_client_frame(
    hub: &BroadcastHub,
    client: ClientId,
    text: &str,
) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { channel }) => {
            if let Err(e) = hub.subscribe(client, channel) {
                warn!(client = %client, error = %e, "Subscribe failed");
            }
            None
        }
        Ok(ClientMessage::Unsubscribe) => {
            hub.unsubscribe(client);
            None
        }
        Ok(ClientMessage::Heartbeat) => Some(ServerMessage::heartbeat_ok()),
        Err(e) => {
            debug!(client = %client, error = %e, "Dropped malformed client frame");
            None
        }
    }
}

async fn subscriber_session(state: AppState, mut socket: WebSocket) {
    let (client, mut outbound) = state.hub.connect();

    loop {
        tokio::select! {
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_frame(&state.hub, client, &text) {
                            if send_message(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client = %client, error = %e, "Socket receive error");
                        break;
                    }
                }
            }
            message = outbound.recv() => {
                match message {
                    Some(message) => {
                        if send_message(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    // Hub pruned this client.
                    None => break,
                }
            }
        }
    }

    state.hub.disconnect(client);
}

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(text)).await.map_err(|_| ())
}
