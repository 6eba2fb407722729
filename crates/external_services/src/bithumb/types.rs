//! Bithumb REST payloads.
//!
//! Bithumb sends most numbers as strings; `lenient_f64` accepts either form and
//! treats anything unparsable as zero.

use serde::{Deserialize, Deserializer, Serialize};

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// One symbol of `public/ticker/{SYM}_KRW` or `ALL_KRW`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TickerData {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub opening_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub closing_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub prev_closing_price: f64,
    #[serde(rename = "units_traded_24H", default, deserialize_with = "lenient_f64")]
    pub units_traded_24h: f64,
    #[serde(rename = "acc_trade_value_24H", default, deserialize_with = "lenient_f64")]
    pub acc_trade_value_24h: f64,
    #[serde(rename = "fluctate_24H", default, deserialize_with = "lenient_f64")]
    pub fluctate_24h: f64,
    #[serde(rename = "fluctate_rate_24H", default, deserialize_with = "lenient_f64")]
    pub fluctate_rate_24h: f64,
    #[serde(default)]
    pub date: Option<String>,
}

/// Entry of `v1/market/all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub korean_name: String,
    #[serde(default)]
    pub english_name: String,
    #[serde(default)]
    pub market_warning: Option<String>,
}

impl MarketInfo {
    /// Base symbol if this is a KRW market. Accepts `KRW-BTC` and `BTC_KRW`.
    pub fn krw_symbol(&self) -> Option<&str> {
        self.market
            .strip_prefix("KRW-")
            .or_else(|| self.market.strip_suffix("_KRW"))
            .filter(|s| !s.is_empty())
    }

    pub fn warning(&self) -> &str {
        match self.market_warning.as_deref() {
            Some(w) if !w.is_empty() => w,
            _ => "NONE",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderbookLevel {
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub quantity: f64,
}

/// `public/orderbook/{SYM}_KRW` data block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderbookData {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub order_currency: Option<String>,
    #[serde(default)]
    pub payment_currency: Option<String>,
    #[serde(default)]
    pub bids: Vec<OrderbookLevel>,
    #[serde(default)]
    pub asks: Vec<OrderbookLevel>,
}

impl OrderbookData {
    /// Best bid price, else best ask, else zero.
    pub fn reference_price(&self) -> f64 {
        self.bids
            .first()
            .map(|l| l.price)
            .filter(|p| *p > 0.0)
            .or_else(|| self.asks.first().map(|l| l.price))
            .unwrap_or(0.0)
    }
}

/// Candlestick intervals the exchange accepts.
pub const CHART_INTERVALS: &[&str] = &["1m", "3m", "5m", "10m", "30m", "1h", "6h", "12h", "24h"];

/// One row of `public/candlestick/{SYM}_KRW/{interval}`.
///
/// The exchange sends `[timestamp_ms, open, close, high, low, volume]` with
/// the prices as strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

fn number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Candle {
    pub fn from_row(row: &[serde_json::Value]) -> Option<Self> {
        let [ts, open, close, high, low, volume] = row else {
            return None;
        };
        Some(Self {
            timestamp: number(ts)? as i64,
            open: number(open)?,
            close: number(close)?,
            high: number(high)?,
            low: number(low)?,
            volume: number(volume)?,
        })
    }
}

/// `{"status": "0000", "data": ...}` wrapper used by the public API.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

pub const STATUS_OK: &str = "0000";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_accepts_strings_and_numbers() {
        let ticker: TickerData = serde_json::from_str(
            r#"{"closing_price":"163800000","fluctate_rate_24H":0.37,"acc_trade_value_24H":"bad"}"#,
        )
        .unwrap();
        assert_eq!(ticker.closing_price, 163_800_000.0);
        assert_eq!(ticker.fluctate_rate_24h, 0.37);
        assert_eq!(ticker.acc_trade_value_24h, 0.0);
    }

    #[test]
    fn test_candle_row() {
        let row: Vec<serde_json::Value> =
            serde_json::from_str(r#"[1700000000000,"100","110","120","90","5.5"]"#).unwrap();
        let candle = Candle::from_row(&row).unwrap();
        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.close, 110.0);
        assert_eq!(candle.low, 90.0);
        assert_eq!(candle.volume, 5.5);

        assert!(Candle::from_row(&row[..5]).is_none());
        let bad: Vec<serde_json::Value> =
            serde_json::from_str(r#"[1,"x","1","1","1","1"]"#).unwrap();
        assert!(Candle::from_row(&bad).is_none());
    }

    #[test]
    fn test_market_symbol_forms() {
        let dash = MarketInfo {
            market: "KRW-BTC".into(),
            ..Default::default()
        };
        let underscore = MarketInfo {
            market: "ETH_KRW".into(),
            ..Default::default()
        };
        let btc_market = MarketInfo {
            market: "BTC-ETH".into(),
            ..Default::default()
        };
        assert_eq!(dash.krw_symbol(), Some("BTC"));
        assert_eq!(underscore.krw_symbol(), Some("ETH"));
        assert_eq!(btc_market.krw_symbol(), None);
        assert_eq!(dash.warning(), "NONE");
    }

    #[test]
    fn test_orderbook_reference_price() {
        let book: OrderbookData = serde_json::from_str(
            r#"{"bids":[],"asks":[{"price":"5924000","quantity":"0.1"}]}"#,
        )
        .unwrap();
        assert_eq!(book.reference_price(), 5_924_000.0);
        assert_eq!(OrderbookData::default().reference_price(), 0.0);
    }
}
