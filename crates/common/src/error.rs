//! Error types for the streaming layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Channel closed")]
    ChannelClosed,

    /// A frame that could not be turned into a tick. Never fatal on its own.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("{0} consecutive malformed frames")]
    MalformedBurst(u32),

    #[error("No frames after {0} liveness pings")]
    ReadTimeout(u32),

    #[error("Gave up after {0} connection attempts")]
    RetriesExhausted(u32),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    /// Whether this error only describes a single bad frame.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Error::MalformedFrame(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
