//! Runtime configuration from environment variables.

use crate::error::{GatewayError, Result};
use external_services::bithumb::WS_URL;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http_port: u16,
    pub metrics_port: u16,
    pub redis_url: Option<String>,
    pub snapshot_ttl: Duration,
    pub watch_interval: Duration,
    pub fx_ttl: Duration,
    pub valuation_ttl: Duration,
    pub coingecko_api_key: Option<String>,
    pub bithumb_ws_url: String,
    pub ingest_read_timeout: Duration,
    pub ingest_max_missed_reads: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8000,
            metrics_port: 9093,
            redis_url: None,
            snapshot_ttl: Duration::from_secs(300),
            watch_interval: Duration::from_secs(30),
            fx_ttl: Duration::from_secs(3600),
            valuation_ttl: Duration::from_secs(300),
            coingecko_api_key: None,
            bithumb_ws_url: WS_URL.to_string(),
            ingest_read_timeout: Duration::from_secs(30),
            ingest_max_missed_reads: 3,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| GatewayError::Config {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    parse(lookup, key, default.as_secs()).map(Duration::from_secs)
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = move |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            http_port: parse(&lookup, "HTTP_PORT", defaults.http_port)?,
            metrics_port: parse(&lookup, "METRICS_PORT", defaults.metrics_port)?,
            redis_url: lookup("REDIS_URL"),
            snapshot_ttl: secs(&lookup, "SNAPSHOT_TTL_SECS", defaults.snapshot_ttl)?,
            watch_interval: secs(&lookup, "WATCH_INTERVAL_SECS", defaults.watch_interval)?,
            fx_ttl: secs(&lookup, "FX_TTL_SECS", defaults.fx_ttl)?,
            valuation_ttl: secs(&lookup, "VALUATION_TTL_SECS", defaults.valuation_ttl)?,
            coingecko_api_key: lookup("COINGECKO_API_KEY"),
            bithumb_ws_url: lookup("BITHUMB_WS_URL").unwrap_or(defaults.bithumb_ws_url),
            ingest_read_timeout: secs(
                &lookup,
                "INGEST_READ_TIMEOUT_SECS",
                defaults.ingest_read_timeout,
            )?,
            ingest_max_missed_reads: parse(
                &lookup,
                "INGEST_MAX_MISSED_READS",
                defaults.ingest_max_missed_reads,
            )?,
        })
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  HTTP_PORT: {}", self.http_port);
        info!("  METRICS_PORT: {}", self.metrics_port);
        info!("  REDIS_URL: {}", self.redis_url.as_deref().unwrap_or("(unset)"));
        info!("  SNAPSHOT_TTL_SECS: {}", self.snapshot_ttl.as_secs());
        info!("  WATCH_INTERVAL_SECS: {}", self.watch_interval.as_secs());
        info!("  FX_TTL_SECS: {}", self.fx_ttl.as_secs());
        info!("  VALUATION_TTL_SECS: {}", self.valuation_ttl.as_secs());
        info!(
            "  COINGECKO_API_KEY: {}",
            if self.coingecko_api_key.is_some() { "(set)" } else { "(unset)" }
        );
        info!("  BITHUMB_WS_URL: {}", self.bithumb_ws_url);
        info!("  INGEST_READ_TIMEOUT_SECS: {}", self.ingest_read_timeout.as_secs());
        info!("  INGEST_MAX_MISSED_READS: {}", self.ingest_max_missed_reads);
    }
}
