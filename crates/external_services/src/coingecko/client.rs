//! CoinGecko client with an in-memory symbol catalogue and per-id valuation cache.

use super::types::{CoinDetailResponse, CoinListEntry, Valuation};
use crate::error::{Error, Result};
use crate::upstream::{Destination, HttpRequest, UpstreamGateway};
use common::RetryPolicy;
use dashmap::DashMap;
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone)]
pub struct EnricherConfig {
    /// Lifetime of one coin's valuation.
    pub valuation_ttl: Duration,
    /// How long a loaded symbol catalogue is trusted.
    pub catalogue_refresh: Duration,
    /// Minimum gap between catalogue loads after a failed one.
    pub catalogue_cooldown: Duration,
    /// Sent as `x-cg-demo-api-key` when present.
    pub api_key: Option<String>,
    pub catalogue_retry: RetryPolicy,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            valuation_ttl: Duration::from_secs(300),
            catalogue_refresh: Duration::from_secs(24 * 3600),
            catalogue_cooldown: Duration::from_secs(60),
            api_key: None,
            catalogue_retry: RetryPolicy::exponential(2, Duration::from_millis(500)),
        }
    }
}

struct Catalogue {
    ids: HashMap<String, String>,
    loaded_at: Instant,
}

/// Symbol/market-cap enricher backed by CoinGecko.
pub struct CoinGeckoClient {
    gateway: Arc<UpstreamGateway>,
    base_url: String,
    config: EnricherConfig,
    catalogue: RwLock<Option<Arc<Catalogue>>>,
    /// Serializes loads; holds the time of the last failed one.
    catalogue_load: tokio::sync::Mutex<Option<Instant>>,
    valuations: DashMap<String, (Valuation, Instant)>,
}

impl CoinGeckoClient {
    pub fn new(gateway: Arc<UpstreamGateway>, config: EnricherConfig) -> Self {
        Self::with_base_url(gateway, COINGECKO_API_URL, config)
    }

    pub fn with_base_url(
        gateway: Arc<UpstreamGateway>,
        base_url: impl Into<String>,
        config: EnricherConfig,
    ) -> Self {
        Self {
            gateway,
            base_url: base_url.into(),
            config,
            catalogue: RwLock::new(None),
            catalogue_load: tokio::sync::Mutex::new(None),
            valuations: DashMap::new(),
        }
    }

    fn request(&self, url: String) -> HttpRequest {
        let request = HttpRequest::get(url).with_timeout(Duration::from_secs(10));
        match &self.config.api_key {
            Some(key) => request.with_header("x-cg-demo-api-key", key.clone()),
            None => request,
        }
    }

    fn current_catalogue(&self) -> Option<Arc<Catalogue>> {
        self.catalogue
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn is_fresh(&self, catalogue: &Catalogue) -> bool {
        catalogue.loaded_at.elapsed() < self.config.catalogue_refresh
    }

    /// Current catalogue, loading or refreshing it if needed.
    /// A failed refresh keeps serving the previous catalogue, and no reload
    /// is attempted until `catalogue_cooldown` has passed.
    async fn catalogue(&self) -> Option<Arc<Catalogue>> {
        if let Some(cat) = self.current_catalogue() {
            if self.is_fresh(&cat) {
                return Some(cat);
            }
        }

        let mut last_failure = self.catalogue_load.lock().await;
        let existing = self.current_catalogue();
        if let Some(cat) = &existing {
            if self.is_fresh(cat) {
                return existing;
            }
        }
        if let Some(failed_at) = *last_failure {
            if failed_at.elapsed() < self.config.catalogue_cooldown {
                return existing;
            }
        }

        let url = format!("{}/coins/list", self.base_url);
        let loaded = self
            .config
            .catalogue_retry
            .run("coingecko catalogue", move || {
                self.gateway
                    .get_json::<Vec<CoinListEntry>>(Destination::Valuation, self.request(url.clone()))
            })
            .await;

        match loaded {
            Ok(entries) => {
                let mut ids = HashMap::with_capacity(entries.len());
                for entry in entries {
                    if entry.symbol.is_empty() || entry.id.is_empty() {
                        continue;
                    }
                    ids.insert(entry.symbol.to_ascii_uppercase(), entry.id);
                }
                info!("Loaded CoinGecko catalogue with {} symbols", ids.len());
                let fresh = Arc::new(Catalogue {
                    ids,
                    loaded_at: Instant::now(),
                });
                *self.catalogue.write().unwrap_or_else(|p| p.into_inner()) = Some(fresh.clone());
                *last_failure = None;
                Some(fresh)
            }
            Err(e) => {
                warn!("CoinGecko catalogue unavailable: {}", e);
                *last_failure = Some(Instant::now());
                existing
            }
        }
    }

    /// Provider id for `symbol`, case-insensitive.
    ///
    /// Without any catalogue the lowercase symbol is used as a guess.
    pub async fn resolve_id(&self, symbol: &str) -> Result<String> {
        let upper = symbol.to_ascii_uppercase();
        match self.catalogue().await {
            Some(cat) => cat
                .ids
                .get(&upper)
                .cloned()
                .ok_or(Error::EnrichmentMiss(upper)),
            None => Ok(symbol.to_ascii_lowercase()),
        }
    }

    /// Valuation for a provider id, cached per id.
    pub async fn get_valuation(&self, coingecko_id: &str) -> Result<Valuation> {
        if let Some(entry) = self.valuations.get(coingecko_id) {
            let (valuation, expires_at) = entry.value();
            if Instant::now() < *expires_at {
                return Ok(valuation.clone());
            }
        }

        let url = format!(
            "{}/coins/{}?localization=false&tickers=false&market_data=true&community_data=false&developer_data=false&sparkline=false",
            self.base_url, coingecko_id
        );
        let detail: CoinDetailResponse = self
            .gateway
            .get_json(Destination::Valuation, self.request(url))
            .await?;

        let valuation = Valuation::from_detail(coingecko_id, &detail)
            .ok_or_else(|| Error::UpstreamData(format!("no market_data for {}", coingecko_id)))?;

        self.valuations.insert(
            coingecko_id.to_string(),
            (valuation.clone(), Instant::now() + self.config.valuation_ttl),
        );
        Ok(valuation)
    }

    /// Resolve and value `symbol`. Any failure degrades to `None`.
    pub async fn enrich(&self, symbol: &str) -> Option<Valuation> {
        let result = match self.resolve_id(symbol).await {
            Ok(id) => self.get_valuation(&id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(valuation) => Some(valuation),
            Err(e) => {
                debug!("No enrichment for {}: {}", symbol, e);
                counter!("enrichment_misses_total", "kind" => e.kind()).increment(1);
                None
            }
        }
    }

    /// Drop expired valuations.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.valuations.len();
        self.valuations.retain(|_, (_, expires_at)| *expires_at > now);
        before - self.valuations.len()
    }
}
