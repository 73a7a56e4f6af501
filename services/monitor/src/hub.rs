//! Channel-based publish/subscribe fan-out
//!
//! Subscribers hold the receiving half of an unbounded channel; the hub
//! keeps the sending half. A failed send means the receiver is gone, so
//! the client is pruned after the delivery pass. Each channel caches
//! its last published message and replays it to new subscribers, so a
//! client never waits a full publish interval for its first frame.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::messages::ServerMessage;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("unknown client: {0}")]
    UnknownClient(ClientId),
}

/// Named broadcast channel. Parsing rejects unknown names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Market,
    Technical,
    Performance,
    Alerts,
    /// Receives every publish regardless of target channel.
    All,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Market => "market",
            Channel::Technical => "technical",
            Channel::Performance => "performance",
            Channel::Alerts => "alerts",
            Channel::All => "all",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market" => Ok(Channel::Market),
            "technical" => Ok(Channel::Technical),
            "performance" => Ok(Channel::Performance),
            "alerts" => Ok(Channel::Alerts),
            "all" => Ok(Channel::All),
            other => Err(HubError::UnknownChannel(other.to_string())),
        }
    }
}

/// Hub-assigned subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

struct ClientEntry {
    sender: mpsc::UnboundedSender<ServerMessage>,
    /// None only after an explicit unsubscribe.
    channel: Option<Channel>,
}

struct HubInner {
    next_client: u64,
    clients: BTreeMap<ClientId, ClientEntry>,
    last_message: BTreeMap<Channel, ServerMessage>,
}

/// Publish/subscribe hub shared by the publisher, the alert path, and
/// every subscriber socket.
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                next_client: 1,
                clients: BTreeMap::new(),
                last_message: BTreeMap::new(),
            }),
        }
    }

    /// Register a new subscriber. The client starts on the All channel
    /// (with its cached last message replayed, if any), so a client that
    /// never sends a subscribe frame still receives every publish.
    pub fn connect(&self) -> (ClientId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = ClientId(inner.next_client);
        inner.next_client += 1;
        if let Some(cached) = inner.last_message.get(&Channel::All) {
            let _ = sender.send(cached.clone());
        }
        inner.clients.insert(
            id,
            ClientEntry {
                sender,
                channel: Some(Channel::All),
            },
        );
        info!(client = %id, total = inner.clients.len(), "Subscriber connected");
        (id, receiver)
    }

    /// Put the client on a channel and immediately replay that
    /// channel's cached last message. A client is on at most one
    /// channel, so this doubles as the channel-change operation.
    pub fn subscribe(&self, client: ClientId, channel: Channel) -> Result<(), HubError> {
        let mut inner = self.lock();
        let cached = inner.last_message.get(&channel).cloned();
        let entry = inner
            .clients
            .get_mut(&client)
            .ok_or(HubError::UnknownClient(client))?;
        entry.channel = Some(channel);
        if let Some(message) = cached {
            // Replay failure is handled like any dead receiver, on the
            // next publish pass.
            let _ = entry.sender.send(message);
        }
        debug!(client = %client, channel = %channel, "Subscriber joined channel");
        Ok(())
    }

    /// Move the client to another channel without disconnecting it.
    pub fn change_channel(&self, client: ClientId, to: Channel) -> Result<(), HubError> {
        self.subscribe(client, to)
    }

    /// Take the client off its channel but keep the connection.
    /// Idempotent; unknown clients are ignored.
    pub fn unsubscribe(&self, client: ClientId) {
        let mut inner = self.lock();
        if let Some(entry) = inner.clients.get_mut(&client) {
            entry.channel = None;
        }
    }

    /// Remove the client entirely. Idempotent.
    pub fn disconnect(&self, client: ClientId) {
        let mut inner = self.lock();
        if inner.clients.remove(&client).is_some() {
            info!(client = %client, total = inner.clients.len(), "Subscriber disconnected");
        }
    }

    /// Publish to a channel: cache the message, deliver to every
    /// subscriber of that channel and of All, then prune subscribers
    /// whose receiver is gone. Returns the number of deliveries.
    pub fn publish(&self, channel: Channel, message: ServerMessage) -> usize {
        let mut inner = self.lock();
        inner.last_message.insert(channel, message.clone());
        inner.last_message.insert(Channel::All, message.clone());

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, entry) in &inner.clients {
            let wants = matches!(entry.channel, Some(c) if c == channel || c == Channel::All);
            if !wants {
                continue;
            }
            if entry.sender.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }

        // Prune after the pass; never mutate the map mid-iteration.
        for id in dead {
            inner.clients.remove(&id);
            info!(client = %id, "Pruned dead subscriber");
        }

        delivered
    }

    /// Subscribers currently on a channel.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.lock()
            .clients
            .values()
            .filter(|e| e.channel == Some(channel))
            .count()
    }

    /// Connected clients, subscribed or not.
    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
