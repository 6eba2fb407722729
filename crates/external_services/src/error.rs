//! Error types for upstream providers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Network failure or timeout talking to a provider.
    #[error("Transport error for {url}: {message}")]
    Transport {
        url: String,
        message: String,
        timeout: bool,
    },

    #[error("{url} returned HTTP {status}")]
    UpstreamStatus { url: String, status: u16 },

    /// Payload that could not be parsed or failed validation.
    #[error("Unexpected payload: {0}")]
    UpstreamData(String),

    #[error("No enrichment for {0}")]
    EnrichmentMiss(String),

    #[error("Cache miss: {0}")]
    CacheMiss(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::UpstreamData(e.to_string())
    }
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport { timeout: true, .. })
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport { timeout: true, .. } => "timeout",
            Error::Transport { .. } => "transport",
            Error::UpstreamStatus { .. } => "status",
            Error::UpstreamData(_) => "data",
            Error::EnrichmentMiss(_) => "enrichment_miss",
            Error::CacheMiss(_) => "cache_miss",
            Error::Redis(_) => "redis",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
