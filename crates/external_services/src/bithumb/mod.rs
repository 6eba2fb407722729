//! Bithumb REST and WebSocket plumbing.

pub mod client;
pub mod ticks;
pub mod types;
pub mod websocket;

pub use client::{BithumbClient, BITHUMB_API_URL};
pub use ticks::{global_tick_size, resolve_tick_size, TickRange};
pub use types::{Candle, MarketInfo, OrderbookData, OrderbookLevel, TickerData, CHART_INTERVALS};
pub use websocket::{
    build_subscription_messages, market_code, parse_ticker_frame, StreamTicker, TickerFrame,
    MAX_SYMBOLS_PER_SUBSCRIPTION, WS_URL,
};
