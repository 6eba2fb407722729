//! WebSocket protocol message types.

use aggregator::AssetSnapshot;
use bithumb::LiveTick;
use serde::{Deserialize, Serialize};

/// Message sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application-level keepalive.
    Ping,
}

/// Message sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full market list, always the first message on a connection.
    InitialSnapshot { data: Vec<AssetSnapshot> },
    /// One live price update.
    Tick { content: LiveTick },
    /// The tracked symbol set changed; carries the new list.
    InstrumentSetChanged { data: Vec<AssetSnapshot> },
    /// Pong response to ping.
    Pong,
    /// Error message.
    Error { message: String, code: String },
}
