//! Upbit market listing, used only for Korean display names.

use crate::error::Result;
use crate::upstream::{Destination, HttpRequest, UpstreamGateway};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub const UPBIT_MARKETS_URL: &str = "https://api.upbit.com/v1/market/all";

#[derive(Debug, Deserialize)]
struct UpbitMarket {
    #[serde(default)]
    market: String,
    #[serde(default)]
    korean_name: Option<String>,
}

/// Symbol to Korean name map for `KRW-` markets.
///
/// Loaded on first use. A failed load leaves the map empty and is retried on
/// the next call.
pub struct UpbitNames {
    gateway: Arc<UpstreamGateway>,
    url: String,
    names: RwLock<Option<Arc<HashMap<String, String>>>>,
}

impl UpbitNames {
    pub fn new(gateway: Arc<UpstreamGateway>) -> Self {
        Self::with_url(gateway, UPBIT_MARKETS_URL)
    }

    pub fn with_url(gateway: Arc<UpstreamGateway>, url: impl Into<String>) -> Self {
        Self {
            gateway,
            url: url.into(),
            names: RwLock::new(None),
        }
    }

    fn loaded(&self) -> Option<Arc<HashMap<String, String>>> {
        self.names.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn load(&self) -> Result<HashMap<String, String>> {
        let request = HttpRequest::get(self.url.clone()).with_timeout(Duration::from_secs(5));
        let markets: Vec<UpbitMarket> = self.gateway.get_json(Destination::General, request).await?;

        Ok(markets
            .into_iter()
            .filter_map(|m| {
                let symbol = m.market.strip_prefix("KRW-")?.to_string();
                let name = m.korean_name?.trim().to_string();
                (!name.is_empty()).then_some((symbol, name))
            })
            .collect())
    }

    /// The current map. Empty if Upbit could not be reached.
    pub async fn names(&self) -> Arc<HashMap<String, String>> {
        if let Some(names) = self.loaded() {
            return names;
        }

        match self.load().await {
            Ok(map) => {
                info!("Loaded {} Korean names from Upbit", map.len());
                let map = Arc::new(map);
                *self.names.write().unwrap_or_else(|p| p.into_inner()) = Some(map.clone());
                map
            }
            Err(e) => {
                warn!("Upbit names unavailable: {}", e);
                Arc::new(HashMap::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{HttpResponse, StaticHttpClient};

    const URL: &str = "https://upbit/v1/market/all";

    fn names(http: Arc<StaticHttpClient>) -> UpbitNames {
        UpbitNames::with_url(Arc::new(UpstreamGateway::with_client(http)), URL)
    }

    #[tokio::test]
    async fn test_krw_markets_only_and_loaded_once() {
        let body = r#"[{"market":"KRW-BTC","korean_name":"비트코인"},
                       {"market":"BTC-ETH","korean_name":"이더리움"},
                       {"market":"KRW-XRP","korean_name":"  "}]"#;
        let http = Arc::new(StaticHttpClient::new().route(URL, HttpResponse::ok(body)));
        let upbit = names(http.clone());

        let map = upbit.names().await;
        assert_eq!(map.get("BTC").map(String::as_str), Some("비트코인"));
        assert!(!map.contains_key("ETH"));
        assert!(!map.contains_key("XRP"));

        upbit.names().await;
        assert_eq!(http.count(URL), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let http = Arc::new(StaticHttpClient::new().route(URL, HttpResponse::with_status(503, "")));
        let upbit = names(http.clone());

        assert!(upbit.names().await.is_empty());

        http.set_route(URL, Ok(HttpResponse::ok(r#"[{"market":"KRW-SOL","korean_name":"솔라나"}]"#)));
        assert_eq!(upbit.names().await.get("SOL").map(String::as_str), Some("솔라나"));
        assert_eq!(http.count(URL), 2);
    }
}
