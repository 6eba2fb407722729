//! REST handlers for the market views.
//!
//! Every handler answers 200. Upstream trouble is reported inside the body,
//! either as a degraded `source` or as `{"status":"error","message":...}`.

use crate::ws_server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use external_services::bithumb::CHART_INTERVALS;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Serialize `body` as JSON. Serialization failures become a 500.
fn json_response<T: Serialize>(body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            warn!("Failed to serialize response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "error", "message": e.to_string()})))
                .into_response()
        }
    }
}

fn error_body(message: impl Into<String>) -> Response {
    Json(json!({"status": "error", "message": message.into()})).into_response()
}

/// `GET /api/coins`
pub async fn list_coins(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.aggregator.get_snapshot().await;
    json_response(snapshot.as_ref())
}

/// `GET /api/coins/{symbol}`
pub async fn coin_detail(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    let detail = state.aggregator.coin_detail(&symbol).await;
    json_response(&json!({"status": "success", "data": detail}))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderbookBody<'a> {
    status: &'static str,
    #[serde(flatten)]
    view: &'a aggregator::OrderbookView,
}

/// `GET /api/orderbook/{symbol}`
pub async fn orderbook(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    match state.aggregator.orderbook(&symbol).await {
        Ok(view) => json_response(&OrderbookBody {
            status: "success",
            view: &view,
        }),
        Err(e) => {
            warn!("Orderbook for {} unavailable: {}", symbol, e);
            error_body(e.to_string())
        }
    }
}

/// `GET /api/markets`: KRW listing passthrough.
pub async fn markets(State(state): State<Arc<AppState>>) -> Response {
    match state.aggregator.sources().bithumb.fetch_markets().await {
        Ok(markets) => json_response(&json!({
            "status": "success",
            "totalCount": markets.len(),
            "data": markets,
        })),
        Err(e) => {
            warn!("Market listing unavailable: {}", e);
            error_body(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartParams {
    #[serde(default)]
    interval: Option<String>,
}

/// `GET /api/chart/{symbol}?interval=24h`
pub async fn chart(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<ChartParams>,
) -> Response {
    let symbol = symbol.trim().to_ascii_uppercase();
    let interval = params.interval.unwrap_or_else(|| "24h".to_string());
    if !CHART_INTERVALS.contains(&interval.as_str()) {
        return error_body(format!("unsupported interval {}", interval));
    }

    match state
        .aggregator
        .sources()
        .bithumb
        .fetch_candlesticks(&symbol, &interval)
        .await
    {
        Ok(candles) => json_response(&json!({
            "status": "success",
            "symbol": symbol,
            "interval": interval,
            "data": candles,
        })),
        Err(e) => {
            warn!("Chart for {} unavailable: {}", symbol, e);
            error_body(e.to_string())
        }
    }
}

/// `GET /api/exchange-rate`
pub async fn exchange_rate(State(state): State<Arc<AppState>>) -> Response {
    let resolved = state.aggregator.sources().rates.get_rate().await;
    json_response(&json!({
        "status": "success",
        "rate": resolved.rate,
        "source": resolved.source,
        "stale": resolved.source.is_stale(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use external_services::HttpResponse;

    const ORDERBOOK: &str = "https://api.bithumb.com/public/orderbook/BTC_KRW";
    const MARKETS: &str = "https://api.bithumb.com/v1/market/all";
    const CANDLES_24H: &str = "https://api.bithumb.com/public/candlestick/BTC_KRW/24h";

    async fn body(response: Response) -> serde_json::Value {
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_coins_falls_back_on_ticker_500() {
        let parts = parts(http().route(TICKER_ALL, HttpResponse::with_status(500, "")));
        let json = body(list_coins(State(parts.state())).await).await;

        assert_eq!(json["status"], "success");
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["totalCount"], 3);
        assert_eq!(json["data"][0]["symbol"], "BTC");
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_orderbook_success_carries_tick_size() {
        let book = r#"{"status":"0000","data":{"timestamp":"1","order_currency":"BTC","payment_currency":"KRW",
            "bids":[{"price":"163800000","quantity":"0.5"}],"asks":[{"price":"163900000","quantity":"0.1"}]}}"#;
        let parts = parts(http().route(ORDERBOOK, HttpResponse::ok(book)));
        let json = body(orderbook(State(parts.state()), Path("btc".to_string())).await).await;

        assert_eq!(json["status"], "success");
        assert_eq!(json["symbol"], "BTC");
        assert_eq!(json["tickSize"], 10000.0);
        assert_eq!(json["data"]["bids"][0]["price"], 163_800_000.0);
    }

    #[tokio::test]
    async fn test_orderbook_failure_is_error_body() {
        let parts = parts(http().route(ORDERBOOK, HttpResponse::with_status(503, "")));
        let json = body(orderbook(State(parts.state()), Path("BTC".to_string())).await).await;

        assert_eq!(json["status"], "error");
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn test_coin_detail_placeholder_when_ticker_missing() {
        let parts = parts(http());
        let json = body(coin_detail(State(parts.state()), Path("ETH".to_string())).await).await;

        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["symbol"], "ETH");
        assert_eq!(json["data"]["status"], "fallback_data");
        assert_eq!(json["data"]["displayName"], "이더리움");
    }

    #[tokio::test]
    async fn test_markets_lists_krw_entries() {
        let listing = r#"[{"market":"KRW-BTC","korean_name":"비트코인","english_name":"Bitcoin","market_warning":"NONE"},
            {"market":"BTC-ETH","korean_name":"이더리움","english_name":"Ethereum"}]"#;
        let parts = parts(http().route(MARKETS, HttpResponse::ok(listing)));
        let json = body(markets(State(parts.state())).await).await;

        assert_eq!(json["status"], "success");
        assert_eq!(json["totalCount"], 1);
        assert_eq!(json["data"][0]["market"], "KRW-BTC");
        assert_eq!(json["data"][0]["korean_name"], "비트코인");
    }

    #[tokio::test]
    async fn test_markets_failure_is_error_body() {
        let parts = parts(http().route(MARKETS, HttpResponse::with_status(502, "")));
        let json = body(markets(State(parts.state())).await).await;
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_chart_defaults_to_daily_candles() {
        let candles = r#"{"status":"0000","data":[[1700000000000,"100","110","120","90","5.5"]]}"#;
        let parts = parts(http().route(CANDLES_24H, HttpResponse::ok(candles)));
        let params = ChartParams { interval: None };
        let json = body(chart(State(parts.state()), Path("btc".to_string()), Query(params)).await).await;

        assert_eq!(json["status"], "success");
        assert_eq!(json["symbol"], "BTC");
        assert_eq!(json["interval"], "24h");
        assert_eq!(json["data"][0]["close"], 110.0);
        assert_eq!(json["data"][0]["timestamp"], 1_700_000_000_000i64);
    }

    #[tokio::test]
    async fn test_chart_rejects_unknown_interval_without_upstream_call() {
        let parts = parts(http());
        let params = ChartParams {
            interval: Some("7d".to_string()),
        };
        let json = body(chart(State(parts.state()), Path("BTC".to_string()), Query(params)).await).await;

        assert_eq!(json["status"], "error");
        assert_eq!(parts.http.count("https://api.bithumb.com/public/candlestick"), 0);
    }

    #[tokio::test]
    async fn test_exchange_rate_reports_source() {
        let parts = parts(http());
        let json = body(exchange_rate(State(parts.state())).await).await;

        assert_eq!(json["status"], "success");
        assert!(json["rate"].as_f64().unwrap() > 0.0);
        assert_eq!(json["source"]["kind"], "default");
        assert_eq!(json["stale"], true);
    }
}
