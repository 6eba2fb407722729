//! Per-symbol views: coin detail and orderbook.

use crate::record::{CoinDetail, OrderbookView};
use crate::snapshot::SnapshotAggregator;
use chrono::Local;
use external_services::coingecko::{market_cap, resolve_supply};
use external_services::{korean_name, resolve_tick_size, Result};
use tracing::warn;

/// Levels requested per side.
pub const ORDERBOOK_DEPTH: u32 = 15;

impl SnapshotAggregator {
    /// Exchange ticker joined with enrichment and the fiat rate.
    ///
    /// An unreachable ticker yields [`CoinDetail::placeholder`].
    pub async fn coin_detail(&self, symbol: &str) -> CoinDetail {
        let symbol = symbol.trim().to_ascii_uppercase();
        let sources = self.sources();
        let (ticker, valuation, rate, upbit) = tokio::join!(
            sources.bithumb.fetch_ticker(&symbol),
            sources.coingecko.enrich(&symbol),
            sources.rates.get_rate(),
            sources.upbit.names(),
        );

        let listed = self.listed_asset(&symbol);
        let market_warning = listed
            .as_ref()
            .map(|a| a.warning_flag.clone())
            .unwrap_or_else(|| "NONE".to_string());
        let display_name = listed
            .as_ref()
            .map(|a| a.display_name.clone())
            .or_else(|| upbit.get(&symbol).filter(|n| !n.trim().is_empty()).cloned())
            .or_else(|| korean_name(&symbol).map(str::to_string))
            .unwrap_or_else(|| symbol.clone());

        let ticker = match ticker {
            Ok(ticker) => ticker,
            Err(e) => {
                warn!("Ticker for {} unavailable, serving placeholder: {}", symbol, e);
                return CoinDetail::placeholder(&symbol, &display_name, e.to_string());
            }
        };

        let global_price_krw = valuation.as_ref().map(|v| v.price_usd * rate.rate);
        let global_market_cap_krw = valuation.as_ref().map(|v| v.market_cap_usd * rate.rate);

        let mut price = ticker.closing_price;
        if price <= 0.0 {
            if let Some(global) = global_price_krw.filter(|p| *p > 0.0) {
                price = global;
            }
        }
        let supply = resolve_supply(&symbol, valuation.as_ref().map(|v| &v.supply), price);

        CoinDetail {
            english_name: listed
                .map(|a| a.english_name)
                .unwrap_or_else(|| symbol.clone()),
            display_name,
            current_price: price,
            opening_price: ticker.opening_price,
            max_price: ticker.max_price,
            min_price: ticker.min_price,
            prev_closing_price: ticker.prev_closing_price,
            change_rate: ticker.fluctate_rate_24h,
            change_amount: ticker.fluctate_24h,
            volume: ticker.acc_trade_value_24h,
            units_traded: ticker.units_traded_24h,
            tick_size: resolve_tick_size(&symbol, price),
            market_cap: market_cap(price, supply.supply),
            supply_source: supply.basis,
            market_warning,
            timestamp: ticker.date.clone(),
            coingecko_id: valuation.as_ref().map(|v| v.coingecko_id.clone()),
            price_usd: valuation.as_ref().map(|v| v.price_usd),
            market_cap_usd: valuation.as_ref().map(|v| v.market_cap_usd),
            volume_24h_usd: valuation.as_ref().map(|v| v.volume_usd),
            price_change_24h: valuation.as_ref().map(|v| v.change_24h),
            global_price_krw,
            global_market_cap_krw,
            supply_info: valuation.as_ref().map(|v| v.supply),
            status: None,
            error: None,
            last_updated: Local::now().to_rfc3339(),
            symbol,
        }
    }

    /// Orderbook with the tick size at the best bid (or best ask).
    pub async fn orderbook(&self, symbol: &str) -> Result<OrderbookView> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let data = self
            .sources()
            .bithumb
            .fetch_orderbook(&symbol, ORDERBOOK_DEPTH)
            .await?;
        let tick_size = resolve_tick_size(&symbol, data.reference_price());
        Ok(OrderbookView {
            symbol,
            data,
            tick_size,
        })
    }
}
