//! USD → KRW exchange-rate resolution.
//!
//! Order of preference:
//! 1. the cached rate while it is fresh,
//! 2. JSON providers in priority order,
//! 3. the Naver finance page, scraped with several patterns,
//! 4. the last good rate even if expired,
//! 5. a fixed constant.
//!
//! Only values inside the plausible band are accepted or cached.

use crate::upstream::{Destination, HttpRequest, UpstreamGateway};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const NAVER_FX_URL: &str =
    "https://finance.naver.com/marketindex/exchangeDetail.naver?marketindexCd=FX_USDKRW";

/// A JSON endpoint and the object path to the KRW rate inside it.
#[derive(Debug, Clone)]
pub struct RateProvider {
    pub name: String,
    pub url: String,
    pub path: Vec<String>,
}

impl RateProvider {
    pub fn new(name: &str, url: &str, path: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn extract(&self, body: &serde_json::Value) -> Option<f64> {
        let mut node = body;
        for key in &self.path {
            node = node.get(key)?;
        }
        node.as_f64()
    }
}

/// Built-in providers, highest priority first.
pub fn default_providers() -> Vec<RateProvider> {
    vec![
        RateProvider::new(
            "exchangerate-api",
            "https://api.exchangerate-api.com/v4/latest/USD",
            &["rates", "KRW"],
        ),
        RateProvider::new(
            "exchangerate-host",
            "https://api.exchangerate.host/latest?base=USD&symbols=KRW",
            &["rates", "KRW"],
        ),
        RateProvider::new(
            "fawaz-currency-api",
            "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1/currencies/usd.json",
            &["usd", "krw"],
        ),
    ]
}

/// HTML page with the rate somewhere in it.
#[derive(Debug, Clone)]
pub struct ScrapeSource {
    pub url: String,
    pub patterns: Vec<Regex>,
}

impl ScrapeSource {
    pub fn naver() -> Self {
        let patterns = [
            r#"(?s)class="no_today"[^>]*><em>([0-9,]+\.?[0-9]*)</em>"#,
            r#"(?s)<strong[^>]*class="[^"]*tah[^"]*"[^>]*>([0-9,]{4,}\.?[0-9]*)</strong>"#,
            r#"(?s)id="exchangeList"[^>]*>.*?<em[^>]*>([0-9,]{4,}\.?[0-9]*)</em>"#,
            r#"(?s)현재가[^>]*>.*?([0-9,]{4,}\.?[0-9]*)"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

        Self {
            url: NAVER_FX_URL.to_string(),
            patterns,
        }
    }

    /// First candidate inside the band, trying patterns in order.
    pub fn find_rate(&self, html: &str, config: &FxConfig) -> Option<f64> {
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(html) {
                let Some(raw) = caps.get(1) else { continue };
                let Ok(rate) = raw.as_str().replace(',', "").parse::<f64>() else {
                    continue;
                };
                if config.in_band(rate) {
                    return Some(rate);
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct FxConfig {
    pub ttl: Duration,
    pub min_rate: f64,
    pub max_rate: f64,
    pub fallback_rate: f64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            min_rate: 1350.0,
            max_rate: 1450.0,
            fallback_rate: 1387.0,
        }
    }
}

impl FxConfig {
    pub fn in_band(&self, rate: f64) -> bool {
        rate.is_finite() && rate >= self.min_rate && rate <= self.max_rate
    }
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RateSource {
    Cache,
    Provider(String),
    Scrape,
    StaleCache,
    Default,
}

impl RateSource {
    /// True for anything other than a fresh cached or live value.
    pub fn is_stale(&self) -> bool {
        matches!(self, RateSource::StaleCache | RateSource::Default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub rate: f64,
    pub source: RateSource,
}

#[derive(Debug, Clone, Copy)]
struct ExchangeRateCacheEntry {
    rate: f64,
    captured_at: Instant,
}

pub struct RateResolver {
    gateway: Arc<UpstreamGateway>,
    providers: Vec<RateProvider>,
    scrape: Option<ScrapeSource>,
    config: FxConfig,
    cache: RwLock<Option<ExchangeRateCacheEntry>>,
}

impl RateResolver {
    /// Resolver with the built-in providers and the Naver scrape fallback.
    pub fn new(gateway: Arc<UpstreamGateway>, config: FxConfig) -> Self {
        Self::with_sources(gateway, default_providers(), Some(ScrapeSource::naver()), config)
    }

    pub fn with_sources(
        gateway: Arc<UpstreamGateway>,
        providers: Vec<RateProvider>,
        scrape: Option<ScrapeSource>,
        config: FxConfig,
    ) -> Self {
        Self {
            gateway,
            providers,
            scrape,
            config,
            cache: RwLock::new(None),
        }
    }

    fn cached(&self) -> Option<ExchangeRateCacheEntry> {
        *self.cache.read().unwrap_or_else(|p| p.into_inner())
    }

    fn store(&self, rate: f64) {
        *self.cache.write().unwrap_or_else(|p| p.into_inner()) = Some(ExchangeRateCacheEntry {
            rate,
            captured_at: Instant::now(),
        });
    }

    /// Resolve the rate. Never fails; the source says how good the value is.
    pub async fn get_rate(&self) -> ResolvedRate {
        if let Some(entry) = self.cached() {
            if entry.captured_at.elapsed() < self.config.ttl && self.config.in_band(entry.rate) {
                return ResolvedRate {
                    rate: entry.rate,
                    source: RateSource::Cache,
                };
            }
        }

        for provider in &self.providers {
            match self.query_provider(provider).await {
                Some(rate) => {
                    info!("USD/KRW {} from {}", rate, provider.name);
                    self.store(rate);
                    return ResolvedRate {
                        rate,
                        source: RateSource::Provider(provider.name.clone()),
                    };
                }
                None => continue,
            }
        }

        if let Some(rate) = self.scrape_rate().await {
            info!("USD/KRW {} from scrape fallback", rate);
            self.store(rate);
            return ResolvedRate {
                rate,
                source: RateSource::Scrape,
            };
        }

        if let Some(entry) = self.cached() {
            warn!("All FX sources failed, serving expired rate {}", entry.rate);
            return ResolvedRate {
                rate: entry.rate,
                source: RateSource::StaleCache,
            };
        }

        warn!(
            "All FX sources failed and nothing cached, using {}",
            self.config.fallback_rate
        );
        ResolvedRate {
            rate: self.config.fallback_rate,
            source: RateSource::Default,
        }
    }

    async fn query_provider(&self, provider: &RateProvider) -> Option<f64> {
        let body: serde_json::Value = match self
            .gateway
            .get_json(Destination::General, HttpRequest::get(&provider.url))
            .await
        {
            Ok(body) => body,
            Err(e) => {
                debug!("FX provider {} failed: {}", provider.name, e);
                return None;
            }
        };

        let rate = provider.extract(&body)?;
        if self.config.in_band(rate) {
            Some(rate)
        } else {
            warn!(
                "FX provider {} returned {} outside {}..={}, skipping",
                provider.name, rate, self.config.min_rate, self.config.max_rate
            );
            None
        }
    }

    async fn scrape_rate(&self) -> Option<f64> {
        let source = self.scrape.as_ref()?;
        let request = HttpRequest::get(&source.url)
            .with_header("User-Agent", BROWSER_USER_AGENT)
            .with_timeout(Duration::from_secs(15));

        match self.gateway.get_text(Destination::General, request).await {
            Ok(html) => source.find_rate(&html, &self.config),
            Err(e) => {
                debug!("FX scrape failed: {}", e);
                None
            }
        }
    }
}
