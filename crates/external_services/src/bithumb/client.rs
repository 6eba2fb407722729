//! Bithumb REST API client.

use super::types::{Candle, Envelope, MarketInfo, OrderbookData, TickerData, STATUS_OK};
use crate::error::{Error, Result};
use crate::upstream::{Destination, HttpRequest, UpstreamGateway};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Base URL for the Bithumb public API.
pub const BITHUMB_API_URL: &str = "https://api.bithumb.com";

/// Bithumb REST API client. All calls go through the `General` gate.
#[derive(Clone)]
pub struct BithumbClient {
    gateway: Arc<UpstreamGateway>,
    base_url: String,
}

impl BithumbClient {
    pub fn new(gateway: Arc<UpstreamGateway>) -> Self {
        Self::with_base_url(gateway, BITHUMB_API_URL)
    }

    pub fn with_base_url(gateway: Arc<UpstreamGateway>, base_url: impl Into<String>) -> Self {
        Self {
            gateway,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_data<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!("Fetching from: {}", url);
        let envelope: Envelope<T> = self
            .gateway
            .get_json(Destination::General, HttpRequest::get(url.clone()))
            .await?;

        if envelope.status != STATUS_OK {
            return Err(Error::UpstreamData(format!(
                "{} returned status {}: {}",
                url,
                envelope.status,
                envelope.message.unwrap_or_default()
            )));
        }
        envelope
            .data
            .ok_or_else(|| Error::UpstreamData(format!("{} returned no data", url)))
    }

    /// Every KRW ticker, in the order the exchange lists them.
    pub async fn fetch_all_tickers(&self) -> Result<Vec<(String, TickerData)>> {
        let url = format!("{}/public/ticker/ALL_KRW", self.base_url);
        let data: serde_json::Map<String, serde_json::Value> = self.get_data(url).await?;

        let mut tickers = Vec::with_capacity(data.len());
        for (symbol, value) in data {
            if symbol == "date" || !value.is_object() {
                continue;
            }
            match serde_json::from_value::<TickerData>(value) {
                Ok(ticker) => tickers.push((symbol, ticker)),
                Err(e) => debug!("Skipping ticker {}: {}", symbol, e),
            }
        }
        Ok(tickers)
    }

    /// KRW market listing with exchange display names.
    pub async fn fetch_markets(&self) -> Result<Vec<MarketInfo>> {
        let url = format!("{}/v1/market/all", self.base_url);
        let markets: Vec<MarketInfo> = self
            .gateway
            .get_json(Destination::General, HttpRequest::get(url))
            .await?;
        Ok(markets
            .into_iter()
            .filter(|m| m.krw_symbol().is_some())
            .collect())
    }

    pub async fn fetch_ticker(&self, symbol: &str) -> Result<TickerData> {
        let url = format!(
            "{}/public/ticker/{}_KRW",
            self.base_url,
            symbol.to_ascii_uppercase()
        );
        self.get_data(url).await
    }

    pub async fn fetch_orderbook(&self, symbol: &str, count: u32) -> Result<OrderbookData> {
        let url = format!(
            "{}/public/orderbook/{}_KRW?count={}",
            self.base_url,
            symbol.to_ascii_uppercase(),
            count
        );
        self.get_data(url).await
    }

    /// Candles for `symbol`, oldest first as the exchange sends them.
    /// A row that does not decode fails the whole call.
    pub async fn fetch_candlesticks(&self, symbol: &str, interval: &str) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/public/candlestick/{}_KRW/{}",
            self.base_url,
            symbol.to_ascii_uppercase(),
            interval
        );
        let rows: Vec<Vec<serde_json::Value>> = self.get_data(url.clone()).await?;
        rows.iter()
            .map(|row| {
                Candle::from_row(row)
                    .ok_or_else(|| Error::UpstreamData(format!("{} returned a malformed candle", url)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{HttpResponse, StaticHttpClient};

    fn client(http: StaticHttpClient) -> BithumbClient {
        BithumbClient::with_base_url(
            Arc::new(UpstreamGateway::with_client(Arc::new(http))),
            "https://bt",
        )
    }

    #[test]
    fn test_default_base_url() {
        let client = BithumbClient::new(Arc::new(UpstreamGateway::new()));
        assert_eq!(client.base_url(), "https://api.bithumb.com");
    }

    #[tokio::test]
    async fn test_all_tickers_keeps_order_and_skips_date() {
        let body = r#"{"status":"0000","data":{
            "XRP":{"closing_price":"4376","acc_trade_value_24H":"10"},
            "BTC":{"closing_price":"163800000","acc_trade_value_24H":"20"},
            "date":"1700000000000"}}"#;
        let client = client(StaticHttpClient::new().route("https://bt/public/ticker/ALL_KRW", HttpResponse::ok(body)));

        let tickers = client.fetch_all_tickers().await.unwrap();
        let symbols: Vec<&str> = tickers.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(symbols, vec!["XRP", "BTC"]);
        assert_eq!(tickers[1].1.closing_price, 163_800_000.0);
    }

    #[tokio::test]
    async fn test_non_ok_status_is_data_error() {
        let body = r#"{"status":"5600","message":"maintenance"}"#;
        let client = client(StaticHttpClient::new().route("https://bt/public/ticker/ALL_KRW", HttpResponse::ok(body)));

        let err = client.fetch_all_tickers().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamData(ref m) if m.contains("5600")));
    }

    #[tokio::test]
    async fn test_http_error_is_status_error() {
        let client = client(StaticHttpClient::new().route("https://bt/public/ticker/ALL_KRW", HttpResponse::with_status(500, "")));
        assert!(matches!(
            client.fetch_all_tickers().await,
            Err(Error::UpstreamStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_markets_filters_non_krw() {
        let body = r#"[{"market":"KRW-BTC","korean_name":"비트코인","english_name":"Bitcoin"},
                       {"market":"BTC-ETH","korean_name":"이더리움","english_name":"Ethereum"},
                       {"market":"XRP_KRW","korean_name":"리플","english_name":"Ripple","market_warning":"CAUTION"}]"#;
        let client = client(StaticHttpClient::new().route("https://bt/v1/market/all", HttpResponse::ok(body)));

        let markets = client.fetch_markets().await.unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[1].krw_symbol(), Some("XRP"));
        assert_eq!(markets[1].warning(), "CAUTION");
    }

    #[tokio::test]
    async fn test_candlesticks_url_and_rows() {
        let body = r#"{"status":"0000","data":[[1,"10","11","12","9","1"],[2,"11","13","14","10","2"]]}"#;
        let http = StaticHttpClient::new().route("https://bt/public/candlestick/BTC_KRW/1h", HttpResponse::ok(body));
        let client = client(http);

        let candles = client.fetch_candlesticks("btc", "1h").await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].timestamp, 2);
        assert_eq!(candles[1].high, 14.0);
    }

    #[tokio::test]
    async fn test_malformed_candle_is_upstream_data_error() {
        let body = r#"{"status":"0000","data":[[1,"10"]]}"#;
        let http = StaticHttpClient::new().route("https://bt/public/candlestick/BTC_KRW/24h", HttpResponse::ok(body));
        let err = client(http).fetch_candlesticks("BTC", "24h").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamData(_)));
    }

    #[tokio::test]
    async fn test_orderbook_url_and_parse() {
        let body = r#"{"status":"0000","data":{"order_currency":"ETH","payment_currency":"KRW",
            "bids":[{"price":"5923000","quantity":"1.2"}],"asks":[{"price":"5924000","quantity":"0.4"}]}}"#;
        let http = StaticHttpClient::new().route("https://bt/public/orderbook/ETH_KRW?count=15", HttpResponse::ok(body));
        let client = client(http);

        let book = client.fetch_orderbook("eth", 15).await.unwrap();
        assert_eq!(book.bids[0].price, 5_923_000.0);
        assert_eq!(book.reference_price(), 5_923_000.0);
    }
}
