//! Subscriber state and the broadcast hub.
//!
//! Uses lock-free DashMap for concurrent register/publish. Each subscriber
//! owns a bounded channel; a send that fails (full or closed) removes the
//! subscriber instead of blocking the publisher.

use crate::error::{GatewayError, Result};
use crate::protocol::ServerMessage;
use axum::extract::ws::{Message, Utf8Bytes};
use bithumb::{LiveTick, TickSink};
use chrono::Utc;
use dashmap::DashMap;
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique client identifier.
pub type ClientId = Uuid;

/// Default buffer size for client message channels.
pub const CLIENT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// Lifecycle of one subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberPhase {
    Connecting,
    Active,
    Closing,
    Failed,
}

impl SubscriberPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriberPhase::Connecting,
            1 => SubscriberPhase::Active,
            2 => SubscriberPhase::Closing,
            _ => SubscriberPhase::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SubscriberPhase::Connecting => 0,
            SubscriberPhase::Active => 1,
            SubscriberPhase::Closing => 2,
            SubscriberPhase::Failed => 3,
        }
    }
}

/// State for a single connected client.
pub struct ClientState {
    /// Unique client identifier.
    pub id: ClientId,
    /// Channel to the client's WebSocket writer.
    pub tx: mpsc::Sender<Message>,
    /// Timestamp when client connected.
    pub connected_at: i64,
    phase: AtomicU8,
}

impl ClientState {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            tx,
            connected_at: now,
            phase: AtomicU8::new(SubscriberPhase::Connecting.as_u8()),
        }
    }

    /// Serialize and send a message to this client without waiting.
    pub fn send(&self, msg: &ServerMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.tx
            .try_send(Message::Text(json.into()))
            .map_err(|_| GatewayError::ChannelSend)
    }

    /// Returns true if sent, false if the buffer is full or closed.
    pub fn try_send_raw(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    pub fn phase(&self) -> SubscriberPhase {
        SubscriberPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: SubscriberPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

}

/// Broadcast hub: registry of connected subscribers.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<ClientState>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn update_gauge(&self) {
        gauge!("gateway_active_connections").set(self.clients.len() as f64);
    }

    /// Make a client visible to `publish`.
    pub fn register(&self, client: Arc<ClientState>) -> ClientId {
        let id = client.id;
        client.set_phase(SubscriberPhase::Active);
        self.clients.insert(id, client);
        self.update_gauge();
        info!("Client {} registered", id);
        id
    }

    /// Enqueue `initial` to the client, then register it.
    ///
    /// Because the seed is queued before the client is visible to
    /// `publish`, it is always the first message the client receives.
    pub fn admit(&self, client: Arc<ClientState>, initial: &ServerMessage) -> Result<ClientId> {
        if let Err(e) = client.send(initial) {
            client.set_phase(SubscriberPhase::Failed);
            warn!("Client {} could not be seeded: {}", client.id, e);
            return Err(e);
        }
        Ok(self.register(client))
    }

    /// Remove a client. Returns false if it was already gone.
    pub fn unregister(&self, client_id: &ClientId) -> bool {
        match self.clients.remove(client_id) {
            Some((_, client)) => {
                if client.phase() == SubscriberPhase::Active {
                    client.set_phase(SubscriberPhase::Closing);
                }
                self.update_gauge();
                info!("Client {} unregistered", client_id);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, client_id: &ClientId) -> Option<Arc<ClientState>> {
        self.clients.get(client_id).map(|r| r.clone())
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send `msg` to every subscriber. Subscribers whose send fails are
    /// removed. Returns the number of successful deliveries.
    pub fn publish(&self, msg: &ServerMessage) -> usize {
        if self.clients.is_empty() {
            return 0;
        }

        // Pre-serialize the message once
        let text: Utf8Bytes = match serde_json::to_string(msg) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!("Failed to serialize broadcast message: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for entry in self.clients.iter() {
            if entry.value().try_send_raw(Message::Text(text.clone())) {
                delivered += 1;
            } else {
                failed.push(*entry.key());
            }
        }

        for id in failed {
            if let Some((_, client)) = self.clients.remove(&id) {
                client.set_phase(SubscriberPhase::Failed);
                counter!("gateway_dropped_subscribers_total").increment(1);
                debug!("Dropped client {} after failed send", id);
            }
        }
        self.update_gauge();
        delivered
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSink for ClientRegistry {
    fn publish_tick(&self, tick: LiveTick) {
        self.publish(&ServerMessage::Tick { content: tick });
    }
}
