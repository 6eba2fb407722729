//! Common types, traits, and utilities for the market-data pipeline.

pub mod error;
pub mod messages;
pub mod retry;
pub mod ws_handler;
pub mod ws_manager;

pub use error::Error;
pub use messages::ControlCommand;
pub use retry::{Backoff, RetryPolicy};
pub use ws_handler::{FrameOutcome, WsHandler};
pub use ws_manager::{StreamPhase, WsManager, WsManagerConfig};
