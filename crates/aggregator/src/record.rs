//! Records the aggregator publishes.

use chrono::Local;
use external_services::bithumb::OrderbookData;
use external_services::coingecko::{estimate_supply, market_cap, SupplyBasis, SupplyInfo};
use external_services::{resolve_tick_size, ResolvedRate};
use serde::{Deserialize, Serialize};

/// One row of the market snapshot. Never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSnapshot {
    pub symbol: String,
    pub display_name: String,
    pub english_name: String,
    pub current_price: f64,
    pub change_rate_24h: f64,
    pub change_amount_24h: f64,
    pub volume_24h: f64,
    pub units_traded_24h: f64,
    pub high_price_24h: f64,
    pub low_price_24h: f64,
    pub market_cap: f64,
    pub circulating_supply: f64,
    pub supply_source: SupplyBasis,
    pub tick_size: f64,
    pub warning_flag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coingecko_id: Option<String>,
}

/// Where a snapshot response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Live,
    Cached,
    Fallback,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Live => "live",
            SnapshotSource::Cached => "cached",
            SnapshotSource::Fallback => "fallback",
        }
    }
}

/// Body of `GET /api/coins`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub status: String,
    pub data: Vec<AssetSnapshot>,
    pub total_count: usize,
    pub last_updated: String,
    pub source: SnapshotSource,
    pub exchange_rate: ResolvedRate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnapshotResponse {
    pub fn new(data: Vec<AssetSnapshot>, source: SnapshotSource, exchange_rate: ResolvedRate) -> Self {
        Self {
            status: "success".to_string(),
            total_count: data.len(),
            data,
            last_updated: Local::now().to_rfc3339(),
            source,
            exchange_rate,
            error: None,
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.data.iter().map(|a| a.symbol.clone()).collect()
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// 24h high/low estimated from the change rate.
pub(crate) fn estimated_range(price: f64, change_rate: f64) -> (f64, f64) {
    let swing = change_rate.abs() / 100.0;
    (round_to(price * (1.0 + swing), 2), round_to(price * (1.0 - swing), 2))
}

/// symbol, Korean name, English name, price, change rate, change amount, volume, units traded
type FallbackRow = (&'static str, &'static str, &'static str, f64, f64, f64, f64, f64);

const FALLBACK_ROWS: &[FallbackRow] = &[
    ("BTC", "비트코인", "Bitcoin", 163_800_000.0, 0.37, 600_000.0, 200_000_000_000.0, 1231.0),
    ("ETH", "이더리움", "Ethereum", 5_924_000.0, 0.59, 35_000.0, 150_000_000_000.0, 2531.0),
    ("XRP", "리플", "XRP", 4_376.0, 0.32, 14.0, 100_000_000_000.0, 15234.0),
];

/// Fixed list served when the exchange ticker is unreachable.
pub fn fallback_assets() -> Vec<AssetSnapshot> {
    FALLBACK_ROWS
        .iter()
        .map(|&(symbol, korean, english, price, change_rate, change_amount, volume, units)| {
            let supply = estimate_supply(symbol, price);
            let (high, low) = estimated_range(price, change_rate);
            AssetSnapshot {
                symbol: symbol.to_string(),
                display_name: korean.to_string(),
                english_name: english.to_string(),
                current_price: price,
                change_rate_24h: change_rate,
                change_amount_24h: change_amount,
                volume_24h: volume,
                units_traded_24h: units,
                high_price_24h: high,
                low_price_24h: low,
                market_cap: round_to(market_cap(price, supply), 2),
                circulating_supply: supply,
                supply_source: SupplyBasis::Estimated,
                tick_size: resolve_tick_size(symbol, price),
                warning_flag: "NONE".to_string(),
                coingecko_id: None,
            }
        })
        .collect()
}

/// Body of `GET /api/coins/{symbol}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinDetail {
    pub symbol: String,
    pub display_name: String,
    pub english_name: String,
    pub current_price: f64,
    pub opening_price: f64,
    pub max_price: f64,
    pub min_price: f64,
    pub prev_closing_price: f64,
    pub change_rate: f64,
    pub change_amount: f64,
    pub volume: f64,
    pub units_traded: f64,
    pub tick_size: f64,
    pub market_cap: f64,
    pub supply_source: SupplyBasis,
    pub market_warning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coingecko_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_24h_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change_24h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_price_krw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_market_cap_krw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_info: Option<SupplyInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_updated: String,
}

impl CoinDetail {
    /// Placeholder served when the exchange has nothing for `symbol`.
    pub fn placeholder(symbol: &str, display_name: &str, error: impl Into<String>) -> Self {
        let price = 100_000.0;
        Self {
            symbol: symbol.to_string(),
            display_name: display_name.to_string(),
            english_name: symbol.to_string(),
            current_price: price,
            opening_price: 0.0,
            max_price: 0.0,
            min_price: 0.0,
            prev_closing_price: 0.0,
            change_rate: 0.0,
            change_amount: 0.0,
            volume: 1_000_000.0,
            units_traded: 0.0,
            tick_size: 1_000.0,
            market_cap: market_cap(price, estimate_supply(symbol, price)),
            supply_source: SupplyBasis::Estimated,
            market_warning: "NONE".to_string(),
            timestamp: None,
            coingecko_id: None,
            price_usd: None,
            market_cap_usd: None,
            volume_24h_usd: None,
            price_change_24h: None,
            global_price_krw: None,
            global_market_cap_krw: None,
            supply_info: None,
            status: Some("fallback_data".to_string()),
            error: Some(error.into()),
            last_updated: Local::now().to_rfc3339(),
        }
    }
}

/// Orderbook plus the tick size at its reference price.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderbookView {
    pub symbol: String,
    pub data: OrderbookData,
    pub tick_size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_assets() {
        let assets = fallback_assets();
        let symbols: Vec<&str> = assets.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "ETH", "XRP"]);
        assert_eq!(assets[0].current_price, 163_800_000.0);
        assert_eq!(assets[2].tick_size, 1.0);
        assert_eq!(assets[0].market_cap, 163_800_000.0 * 19_500_000.0);
    }

    #[test]
    fn test_asset_serializes_camel_case() {
        let json = serde_json::to_value(&fallback_assets()[1]).unwrap();
        assert_eq!(json["displayName"], "이더리움");
        assert_eq!(json["changeRate24h"], 0.59);
        assert_eq!(json["highPrice24h"], 5_958_951.6);
        assert_eq!(json["supplySource"], "estimated");
        assert!(json.get("coingeckoId").is_none());
    }

    #[test]
    fn test_rounding_and_range() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(estimated_range(100.0, -10.0), (110.0, 90.0));
    }

    #[test]
    fn test_placeholder_detail() {
        let detail = CoinDetail::placeholder("ABC", "ABC", "down");
        assert_eq!(detail.current_price, 100_000.0);
        assert_eq!(detail.volume, 1_000_000.0);
        assert_eq!(detail.tick_size, 1_000.0);
        assert_eq!(detail.status.as_deref(), Some("fallback_data"));
    }
}
