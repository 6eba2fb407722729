//! Upstream data sources for the KRW market-data pipeline.
//!
//! - `upstream`: gated HTTP access shared by every client below
//! - `bithumb`: exchange REST client, tick rules and stream message helpers
//! - `coingecko`: symbol catalogue, valuations and supply selection
//! - `fx`: USD/KRW rate resolution
//! - `upbit` / `names`: Korean display names
//! - `cache`: shared cache tier (Redis or no-op)
//!
//! # Example
//!
//! ```ignore
//! use external_services::{BithumbClient, UpstreamGateway};
//!
//! let gateway = Arc::new(UpstreamGateway::new());
//! let bithumb = BithumbClient::new(gateway.clone());
//! let tickers = bithumb.fetch_all_tickers().await?;
//! ```

pub mod bithumb;
pub mod cache;
pub mod coingecko;
pub mod error;
pub mod fx;
pub mod names;
pub mod upbit;
pub mod upstream;

pub use bithumb::{resolve_tick_size, BithumbClient, MarketInfo, OrderbookData, TickerData};
pub use cache::{select_cache, CacheClient, NoopCache, RedisCache, SNAPSHOT_CACHE_KEY};
pub use coingecko::{CoinGeckoClient, EnricherConfig, SupplyBasis, Valuation};
pub use error::{Error, Result};
pub use fx::{FxConfig, RateResolver, RateSource, ResolvedRate};
pub use names::korean_name;
pub use upbit::UpbitNames;
pub use upstream::{
    Destination, HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient, StaticHttpClient,
    UpstreamGateway,
};
