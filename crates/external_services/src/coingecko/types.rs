//! CoinGecko payloads and the valuation record derived from them.

use serde::{Deserialize, Serialize};

/// Entry of `GET /coins/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinListEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
}

/// `GET /coins/{id}` with `market_data=true`. Only the fields we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoinDetailResponse {
    #[serde(default)]
    pub market_data: Option<MarketData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub current_price: Option<UsdQuote>,
    #[serde(default)]
    pub total_volume: Option<UsdQuote>,
    #[serde(default)]
    pub market_cap: Option<UsdQuote>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub circulating_supply: Option<f64>,
    #[serde(default)]
    pub total_supply: Option<f64>,
    #[serde(default)]
    pub max_supply: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsdQuote {
    #[serde(default)]
    pub usd: Option<f64>,
}

fn usd(quote: &Option<UsdQuote>) -> f64 {
    quote.as_ref().and_then(|q| q.usd).unwrap_or(0.0)
}

/// Supply figures as reported. Zero and absent are both "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyInfo {
    pub circulating: Option<f64>,
    pub total: Option<f64>,
    pub max: Option<f64>,
}

/// Enrichment for one coin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub coingecko_id: String,
    pub price_usd: f64,
    /// Provider-reported market cap. Only the detail view shows it.
    pub market_cap_usd: f64,
    pub volume_usd: f64,
    pub change_24h: f64,
    pub supply: SupplyInfo,
}

impl Valuation {
    pub fn from_detail(coingecko_id: &str, detail: &CoinDetailResponse) -> Option<Self> {
        let md = detail.market_data.as_ref()?;
        Some(Self {
            coingecko_id: coingecko_id.to_string(),
            price_usd: usd(&md.current_price),
            market_cap_usd: usd(&md.market_cap),
            volume_usd: usd(&md.total_volume),
            change_24h: md.price_change_percentage_24h.unwrap_or(0.0),
            supply: SupplyInfo {
                circulating: md.circulating_supply,
                total: md.total_supply,
                max: md.max_supply,
            },
        })
    }
}
