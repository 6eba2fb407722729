//! Bithumb public WebSocket utilities.

use serde::{Deserialize, Serialize};

/// Bithumb public stream URL.
pub const WS_URL: &str = "wss://pubwss.bithumb.com/pub/ws";

/// Maximum symbols per subscribe message.
pub const MAX_SYMBOLS_PER_SUBSCRIPTION: usize = 100;

/// Subscription message structure.
#[derive(Debug, Serialize)]
struct SubscriptionMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'a str,
    symbols: Vec<String>,
    #[serde(rename = "tickTypes")]
    tick_types: [&'a str; 1],
}

/// Stream market code for a base symbol, e.g. `BTC` -> `BTC_KRW`.
pub fn market_code(symbol: &str) -> String {
    let upper = symbol.trim().to_ascii_uppercase();
    if upper.ends_with("_KRW") {
        upper
    } else {
        format!("{}_KRW", upper)
    }
}

/// Build the ticker subscribe messages for `symbols`, at most
/// [`MAX_SYMBOLS_PER_SUBSCRIPTION`] per message.
pub fn build_subscription_messages(symbols: &[String]) -> Vec<String> {
    symbols
        .chunks(MAX_SYMBOLS_PER_SUBSCRIPTION)
        .map(|batch| {
            let msg = SubscriptionMessage {
                msg_type: "ticker",
                symbols: batch.iter().map(|s| market_code(s)).collect(),
                tick_types: ["24H"],
            };
            serde_json::to_value(&msg)
                .map(|v| v.to_string())
                .unwrap_or_default()
        })
        .filter(|m| !m.is_empty())
        .collect()
}

/// Raw stream frame. Status frames carry no `content`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerFrame {
    #[serde(rename = "type", default)]
    pub frame_type: Option<String>,
    #[serde(default)]
    pub content: Option<StreamTicker>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub resmsg: Option<String>,
}

/// `content` of a ticker frame. Numbers arrive as strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTicker {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub close_price: Option<String>,
    #[serde(default)]
    pub chg_rate: Option<String>,
    #[serde(default)]
    pub chg_amt: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl TickerFrame {
    pub fn is_ticker(&self) -> bool {
        self.frame_type.as_deref() == Some("ticker")
    }
}

pub fn parse_ticker_frame(text: &str) -> serde_json::Result<TickerFrame> {
    serde_json::from_str(text)
}
