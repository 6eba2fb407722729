//! Bithumb WebSocket handler implementation.
//!
//! Parses ticker frames, strips the `_KRW` suffix and hands each tick to a
//! [`TickSink`] synchronously, so per-symbol order is the stream's order.

use async_trait::async_trait;
use chrono::Utc;
use common::error::{Error, Result};
use common::{ControlCommand, FrameOutcome, WsHandler};
use external_services::bithumb::{build_subscription_messages, parse_ticker_frame, WS_URL};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Normalized live tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTick {
    pub symbol: String,
    pub price: f64,
    pub change_rate: f64,
    pub change_amount: f64,
    pub volume: f64,
    /// Receive time, epoch milliseconds.
    pub timestamp: i64,
}

/// Receiver of normalized ticks.
pub trait TickSink: Send + Sync + 'static {
    fn publish_tick(&self, tick: LiveTick);
}

fn parse_number(field: Option<&str>) -> Option<f64> {
    field
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Bithumb ticker handler. Holds the current symbol set and rebuilds the
/// full subscription whenever it changes.
pub struct BithumbTickerHandler {
    url: String,
    symbols: RwLock<Vec<String>>,
    sink: Arc<dyn TickSink>,
    worker_id: String,
}

impl BithumbTickerHandler {
    pub fn new(symbols: Vec<String>, sink: Arc<dyn TickSink>, worker_id: String) -> Self {
        Self::with_url(WS_URL, symbols, sink, worker_id)
    }

    pub fn with_url(
        url: impl Into<String>,
        symbols: Vec<String>,
        sink: Arc<dyn TickSink>,
        worker_id: String,
    ) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let symbol = symbol.to_ascii_uppercase();
            if !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }
        Self {
            url: url.into(),
            symbols: RwLock::new(unique),
            sink,
            worker_id,
        }
    }

    fn add_symbols(&self, ids: Vec<String>) {
        let mut symbols = self.symbols.write().unwrap_or_else(|p| p.into_inner());
        for id in ids {
            let id = id.to_ascii_uppercase();
            if !symbols.contains(&id) {
                symbols.push(id);
            }
        }
    }

    fn remove_symbols(&self, ids: &[String]) {
        let mut symbols = self.symbols.write().unwrap_or_else(|p| p.into_inner());
        symbols.retain(|s| !ids.iter().any(|id| id.eq_ignore_ascii_case(s)));
    }

    fn parse_tick(&self, msg: &str) -> Result<Option<LiveTick>> {
        let frame = parse_ticker_frame(msg)
            .map_err(|e| Error::MalformedFrame(format!("not JSON: {}", e)))?;

        if !frame.is_ticker() {
            debug!(
                "[{}] Ignoring frame status={:?} msg={:?}",
                self.worker_id, frame.status, frame.resmsg
            );
            return Ok(None);
        }

        let content = frame
            .content
            .ok_or_else(|| Error::MalformedFrame("ticker frame without content".to_string()))?;

        let symbol = content
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::MalformedFrame("ticker without symbol".to_string()))?;
        let symbol = symbol.strip_suffix("_KRW").unwrap_or(symbol).to_string();

        let price = parse_number(content.close_price.as_deref())
            .ok_or_else(|| Error::MalformedFrame(format!("ticker {} without price", symbol)))?;

        Ok(Some(LiveTick {
            symbol,
            price,
            change_rate: parse_number(content.chg_rate.as_deref()).unwrap_or(0.0),
            change_amount: parse_number(content.chg_amt.as_deref()).unwrap_or(0.0),
            volume: parse_number(content.value.as_deref()).unwrap_or(0.0),
            timestamp: Utc::now().timestamp_millis(),
        }))
    }
}

#[async_trait]
impl WsHandler for BithumbTickerHandler {
    fn url(&self) -> &str {
        &self.url
    }

    fn on_connect_messages(&self) -> Vec<String> {
        let symbols = self.symbols.read().unwrap_or_else(|p| p.into_inner());
        build_subscription_messages(&symbols)
    }

    async fn on_message(&self, msg: &str) -> Result<FrameOutcome> {
        match self.parse_tick(msg)? {
            Some(tick) => {
                self.sink.publish_tick(tick);
                counter!("ingester_ticks_published_total").increment(1);
                Ok(FrameOutcome::Data)
            }
            None => Ok(FrameOutcome::Control),
        }
    }

    async fn on_disconnect(&self) {
        warn!("[{}] Bithumb connection lost", self.worker_id);
    }

    async fn on_reconnect(&self) {
        info!(
            "[{}] Bithumb subscribed to {} symbols",
            self.worker_id,
            self.subscription_count()
        );
    }

    /// The stream has no unsubscribe; every change re-sends the whole set.
    async fn handle_command(&self, cmd: ControlCommand) -> Vec<String> {
        match cmd {
            ControlCommand::Subscribe(ids) => {
                info!("[{}] Subscribing to {} symbols", self.worker_id, ids.len());
                self.add_symbols(ids);
            }
            ControlCommand::Unsubscribe(ids) => {
                info!("[{}] Unsubscribing from {} symbols", self.worker_id, ids.len());
                self.remove_symbols(&ids);
            }
            ControlCommand::Shutdown => return Vec::new(),
        }
        self.on_connect_messages()
    }

    fn subscribed_ids(&self) -> Vec<String> {
        self.symbols.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        ticks: Mutex<Vec<LiveTick>>,
    }

    impl TickSink for CollectingSink {
        fn publish_tick(&self, tick: LiveTick) {
            self.ticks.lock().unwrap().push(tick);
        }
    }

    fn handler(symbols: &[&str]) -> (BithumbTickerHandler, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let handler = BithumbTickerHandler::new(
            symbols.iter().map(|s| s.to_string()).collect(),
            sink.clone(),
            "test".to_string(),
        );
        (handler, sink)
    }

    #[tokio::test]
    async fn test_ticker_frame_is_normalized() {
        let (handler, sink) = handler(&["BTC"]);
        let frame = r#"{"type":"ticker","content":{"symbol":"BTC_KRW","closePrice":"163800000","chgRate":"0.37","chgAmt":"600000","value":"4711000000.5"}}"#;

        assert_eq!(handler.on_message(frame).await.unwrap(), FrameOutcome::Data);

        let ticks = sink.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol, "BTC");
        assert_eq!(ticks[0].price, 163_800_000.0);
        assert_eq!(ticks[0].change_rate, 0.37);
        assert_eq!(ticks[0].change_amount, 600_000.0);
        assert_eq!(ticks[0].volume, 4_711_000_000.5);
        assert!(ticks[0].timestamp > 0);
    }

    #[tokio::test]
    async fn test_status_frames_are_ignored() {
        let (handler, sink) = handler(&["BTC"]);
        let status = handler
            .on_message(r#"{"status":"0000","resmsg":"Connected Successfully"}"#)
            .await
            .unwrap();
        let other = handler
            .on_message(r#"{"type":"transaction","content":{"list":[]}}"#)
            .await
            .unwrap();
        assert_eq!(status, FrameOutcome::Control);
        assert_eq!(other, FrameOutcome::Control);
        assert!(sink.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames() {
        let (handler, sink) = handler(&["BTC"]);
        let frames = [
            "not json",
            r#"{"type":"ticker"}"#,
            r#"{"type":"ticker","content":{"closePrice":"1"}}"#,
            r#"{"type":"ticker","content":{"symbol":"BTC_KRW"}}"#,
            r#"{"type":"ticker","content":{"symbol":"BTC_KRW","closePrice":"abc"}}"#,
        ];
        for frame in frames {
            let err = handler.on_message(frame).await.unwrap_err();
            assert!(err.is_malformed_frame(), "{}: {}", frame, err);
        }
        assert!(sink.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commands_resend_full_set() {
        let (handler, _) = handler(&["btc", "ETH", "BTC"]);
        assert_eq!(handler.subscribed_ids(), vec!["BTC", "ETH"]);

        let msgs = handler
            .handle_command(ControlCommand::Subscribe(vec!["XRP".to_string(), "eth".to_string()]))
            .await;
        assert_eq!(msgs.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&msgs[0]).unwrap();
        assert_eq!(parsed["symbols"], serde_json::json!(["BTC_KRW", "ETH_KRW", "XRP_KRW"]));

        handler
            .handle_command(ControlCommand::Unsubscribe(vec!["eth".to_string()]))
            .await;
        assert_eq!(handler.subscribed_ids(), vec!["BTC", "XRP"]);
        assert!(handler.handle_command(ControlCommand::Shutdown).await.is_empty());
    }

    #[test]
    fn test_connect_messages_are_batched() {
        let symbols: Vec<String> = (0..150).map(|i| format!("C{}", i)).collect();
        let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let (handler, _) = handler(&refs);
        assert_eq!(handler.on_connect_messages().len(), 2);
        assert_eq!(handler.url(), WS_URL);
    }
}
