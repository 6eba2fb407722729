//! CoinGecko enrichment: symbol → id resolution, per-coin valuation, supply rules.

pub mod client;
pub mod supply;
pub mod types;

pub use client::{CoinGeckoClient, EnricherConfig, COINGECKO_API_URL};
pub use supply::{estimate_supply, market_cap, resolve_supply, SupplyBasis, SupplyChoice};
pub use types::{SupplyInfo, Valuation};
