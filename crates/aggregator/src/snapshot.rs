//! Snapshot aggregation and its two cache tiers.

use crate::record::{
    estimated_range, fallback_assets, round_to, AssetSnapshot, SnapshotResponse, SnapshotSource,
};
use chrono::DateTime;
use external_services::cache::{self, CacheClient, SNAPSHOT_CACHE_KEY};
use external_services::coingecko::{market_cap, resolve_supply, EnricherConfig, Valuation};
use external_services::{
    korean_name, resolve_tick_size, BithumbClient, CoinGeckoClient, FxConfig, MarketInfo,
    RateResolver, TickerData, UpbitNames, UpstreamGateway,
};
use futures::future::join_all;
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Lifetime of a built snapshot in both tiers.
    pub snapshot_ttl: Duration,
    /// Symbols enriched concurrently per batch.
    pub enrich_batch: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(300),
            enrich_batch: 50,
        }
    }
}

/// Upstream clients the aggregator reads from.
pub struct Sources {
    pub bithumb: BithumbClient,
    pub coingecko: Arc<CoinGeckoClient>,
    pub rates: Arc<RateResolver>,
    pub upbit: Arc<UpbitNames>,
}

impl Sources {
    /// Production endpoints, all sharing one gateway.
    pub fn live(gateway: Arc<UpstreamGateway>, enricher: EnricherConfig, fx: FxConfig) -> Self {
        Self {
            bithumb: BithumbClient::new(gateway.clone()),
            coingecko: Arc::new(CoinGeckoClient::new(gateway.clone(), enricher)),
            rates: Arc::new(RateResolver::new(gateway.clone(), fx)),
            upbit: Arc::new(UpbitNames::new(gateway)),
        }
    }
}

/// Display name priority: exchange Korean, Upbit Korean, exchange English,
/// static table, raw symbol.
pub fn display_name(
    symbol: &str,
    market: Option<&MarketInfo>,
    upbit: &HashMap<String, String>,
) -> String {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    market
        .and_then(|m| non_empty(m.korean_name.as_str()))
        .or_else(|| upbit.get(symbol).and_then(|n| non_empty(n.as_str())))
        .or_else(|| market.and_then(|m| non_empty(m.english_name.as_str())))
        .or_else(|| korean_name(symbol).filter(|n| *n != symbol).map(str::to_string))
        .unwrap_or_else(|| symbol.to_string())
}

fn build_asset(
    symbol: &str,
    ticker: &TickerData,
    market: Option<&MarketInfo>,
    upbit: &HashMap<String, String>,
    valuation: Option<&Valuation>,
) -> AssetSnapshot {
    let price = ticker.closing_price;
    let change_rate = ticker.fluctate_rate_24h;
    let supply = resolve_supply(symbol, valuation.map(|v| &v.supply), price);
    let (high, low) = estimated_range(price, change_rate);

    AssetSnapshot {
        symbol: symbol.to_string(),
        display_name: display_name(symbol, market, upbit),
        english_name: market
            .map(|m| m.english_name.trim())
            .filter(|n| !n.is_empty())
            .unwrap_or(symbol)
            .to_string(),
        current_price: round_to(price, 4),
        change_rate_24h: change_rate,
        change_amount_24h: round_to(ticker.fluctate_24h, 4),
        volume_24h: round_to(ticker.acc_trade_value_24h, 4),
        units_traded_24h: ticker.units_traded_24h,
        high_price_24h: high,
        low_price_24h: low,
        market_cap: round_to(market_cap(price, supply.supply), 2),
        circulating_supply: round_to(supply.supply, 2),
        supply_source: supply.basis,
        tick_size: resolve_tick_size(symbol, price),
        warning_flag: market.map(|m| m.warning()).unwrap_or("NONE").to_string(),
        coingecko_id: valuation.map(|v| v.coingecko_id.clone()),
    }
}

struct CachedSnapshot {
    response: Arc<SnapshotResponse>,
    captured_at: Instant,
}

/// Builds market snapshots and serves them through an in-process tier and
/// the shared cache tier.
pub struct SnapshotAggregator {
    sources: Sources,
    cache: Arc<dyn CacheClient>,
    config: AggregatorConfig,
    latest: RwLock<Option<CachedSnapshot>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl SnapshotAggregator {
    pub fn new(sources: Sources, cache: Arc<dyn CacheClient>, config: AggregatorConfig) -> Self {
        Self {
            sources,
            cache,
            config,
            latest: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Build a fresh snapshot from upstream. Never fails: an unreachable
    /// ticker yields the fallback list with `error` set.
    pub async fn build_snapshot(&self) -> SnapshotResponse {
        let (tickers, markets, rate, upbit) = tokio::join!(
            self.sources.bithumb.fetch_all_tickers(),
            self.sources.bithumb.fetch_markets(),
            self.sources.rates.get_rate(),
            self.sources.upbit.names(),
        );

        let tickers = match tickers {
            Ok(tickers) => tickers,
            Err(e) => {
                warn!("Ticker fetch failed, serving fallback snapshot: {}", e);
                counter!("snapshot_builds_total", "source" => SnapshotSource::Fallback.as_str())
                    .increment(1);
                let mut response =
                    SnapshotResponse::new(fallback_assets(), SnapshotSource::Fallback, rate);
                response.error = Some(e.to_string());
                return response;
            }
        };

        let markets: HashMap<String, MarketInfo> = match markets {
            Ok(markets) => markets
                .into_iter()
                .filter_map(|m| Some((m.krw_symbol()?.to_string(), m)))
                .collect(),
            Err(e) => {
                warn!("Market listing unavailable, names degrade: {}", e);
                HashMap::new()
            }
        };

        let symbols: Vec<&str> = tickers.iter().map(|(s, _)| s.as_str()).collect();
        let mut valuations: HashMap<&str, Valuation> = HashMap::new();
        for batch in symbols.chunks(self.config.enrich_batch.max(1)) {
            let results = join_all(batch.iter().map(|s| self.sources.coingecko.enrich(s))).await;
            for (symbol, valuation) in batch.iter().zip(results) {
                if let Some(valuation) = valuation {
                    valuations.insert(*symbol, valuation);
                }
            }
        }
        debug!("Enriched {}/{} symbols", valuations.len(), symbols.len());

        let mut assets: Vec<AssetSnapshot> = tickers
            .iter()
            .map(|(symbol, ticker)| {
                build_asset(
                    symbol,
                    ticker,
                    markets.get(symbol),
                    &upbit,
                    valuations.get(symbol.as_str()),
                )
            })
            .collect();
        assets.sort_by(|a, b| b.volume_24h.total_cmp(&a.volume_24h));

        info!("Built snapshot of {} assets (USD/KRW {})", assets.len(), rate.rate);
        counter!("snapshot_builds_total", "source" => SnapshotSource::Live.as_str()).increment(1);
        SnapshotResponse::new(assets, SnapshotSource::Live, rate)
    }

    fn fresh_local(&self) -> Option<Arc<SnapshotResponse>> {
        let guard = self.latest.read().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|c| c.captured_at.elapsed() < self.config.snapshot_ttl)
            .map(|c| c.response.clone())
    }

    fn store_local(&self, response: Arc<SnapshotResponse>, age: Duration) {
        let now = Instant::now();
        let captured_at = now.checked_sub(age).unwrap_or(now);
        *self.latest.write().unwrap_or_else(|p| p.into_inner()) = Some(CachedSnapshot {
            response,
            captured_at,
        });
    }

    async fn from_shared_cache(&self) -> Option<(SnapshotResponse, Duration)> {
        let cached: SnapshotResponse =
            match cache::get_json(self.cache.as_ref(), SNAPSHOT_CACHE_KEY).await {
                Ok(hit) => hit?,
                Err(e) => {
                    warn!("Shared cache read failed: {}", e);
                    return None;
                }
            };

        let age = DateTime::parse_from_rfc3339(&cached.last_updated)
            .ok()
            .and_then(|t| (chrono::Local::now() - t.with_timezone(&chrono::Local)).to_std().ok())
            .unwrap_or_default();
        (age < self.config.snapshot_ttl).then_some((cached, age))
    }

    /// Current snapshot: in-process tier, then shared cache, then a fresh build.
    pub async fn get_snapshot(&self) -> Arc<SnapshotResponse> {
        if let Some(hit) = self.fresh_local() {
            return hit;
        }

        let _guard = self.build_lock.lock().await;
        if let Some(hit) = self.fresh_local() {
            return hit;
        }

        if let Some((mut cached, age)) = self.from_shared_cache().await {
            debug!("Snapshot served from {} cache", self.cache.backend());
            cached.source = SnapshotSource::Cached;
            let cached = Arc::new(cached);
            self.store_local(cached.clone(), age);
            return cached;
        }

        let built = self.build_snapshot().await;
        if built.source == SnapshotSource::Fallback {
            return Arc::new(built);
        }

        if let Err(e) =
            cache::set_json(self.cache.as_ref(), SNAPSHOT_CACHE_KEY, &built, self.config.snapshot_ttl).await
        {
            warn!("Shared cache write failed: {}", e);
        }

        let mut local = built.clone();
        local.source = SnapshotSource::Cached;
        self.store_local(Arc::new(local), Duration::ZERO);
        Arc::new(built)
    }

    /// Last known row for `symbol`, fresh or not.
    pub fn listed_asset(&self, symbol: &str) -> Option<AssetSnapshot> {
        let guard = self.latest.read().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()?
            .response
            .data
            .iter()
            .find(|a| a.symbol == symbol)
            .cloned()
    }

    /// Drop expired per-coin valuations.
    pub fn purge_expired(&self) -> usize {
        self.sources.coingecko.purge_expired()
    }
}
