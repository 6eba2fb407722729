//! Bithumb ticker stream handler.

pub mod handler;

pub use handler::{BithumbTickerHandler, LiveTick, TickSink};
