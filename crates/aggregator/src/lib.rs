//! Snapshot aggregation for the KRW market.
//!
//! Joins the exchange ticker with fiat rates, enrichment and display names,
//! and serves the result through an in-process tier and the shared cache.

pub mod detail;
pub mod record;
pub mod snapshot;

pub use detail::ORDERBOOK_DEPTH;
pub use record::{
    fallback_assets, AssetSnapshot, CoinDetail, OrderbookView, SnapshotResponse, SnapshotSource,
};
pub use snapshot::{display_name, AggregatorConfig, SnapshotAggregator, Sources};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::snapshot::{AggregatorConfig, SnapshotAggregator, Sources};
    use async_trait::async_trait;
    use external_services::cache::CacheClient;
    use external_services::coingecko::EnricherConfig;
    use external_services::{FxConfig, NoopCache, Result, StaticHttpClient, UpstreamGateway};
    use common::RetryPolicy;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub const TICKER_ALL: &str = "https://api.bithumb.com/public/ticker/ALL_KRW";
    pub const MARKETS: &str = "https://api.bithumb.com/v1/market/all";
    pub const COINGECKO_LIST: &str = "https://api.coingecko.com/api/v3/coins/list";
    pub const FX_PRIMARY: &str = "https://api.exchangerate-api.com/v4/latest/USD";

    /// Unrouted URLs fail fast with a transport error.
    pub fn http() -> StaticHttpClient {
        StaticHttpClient::new()
    }

    pub fn aggregator(http: StaticHttpClient) -> (SnapshotAggregator, Arc<StaticHttpClient>) {
        aggregator_with_cache(http, Arc::new(NoopCache))
    }

    pub fn aggregator_with_cache(
        http: StaticHttpClient,
        cache: Arc<dyn CacheClient>,
    ) -> (SnapshotAggregator, Arc<StaticHttpClient>) {
        let http = Arc::new(http);
        let gateway = Arc::new(UpstreamGateway::with_client(http.clone()));
        let enricher = EnricherConfig {
            catalogue_retry: RetryPolicy::none(),
            ..EnricherConfig::default()
        };
        let sources = Sources::live(gateway, enricher, FxConfig::default());
        (
            SnapshotAggregator::new(sources, cache, AggregatorConfig::default()),
            http,
        )
    }

    /// In-memory shared cache, ignoring TTLs.
    #[derive(Default)]
    pub struct MemoryCache {
        entries: Mutex<HashMap<String, String>>,
    }

    impl MemoryCache {
        pub fn contains(&self, key: &str) -> bool {
            self.entries.lock().unwrap().contains_key(key)
        }
    }

    #[async_trait]
    impl CacheClient for MemoryCache {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set_ex(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "memory"
        }
    }
}
