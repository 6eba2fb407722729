//! Gateway service entry point.

use aggregator::{AggregatorConfig, SnapshotAggregator, Sources};
use anyhow::Result;
use common::WsManagerConfig;
use external_services::{select_cache, EnricherConfig, FxConfig, UpstreamGateway};
use gateway::{create_router, AppState, ClientRegistry, Config, IngestConfig, IngestSupervisor};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::interval;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Gateway service");

    let config = Config::from_env()?;
    config.log_summary();

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;
    info!("Prometheus metrics server started on port {}", config.metrics_port);

    let cache = select_cache(config.redis_url.as_deref()).await;

    let upstream = Arc::new(UpstreamGateway::new());
    let enricher = EnricherConfig {
        valuation_ttl: config.valuation_ttl,
        api_key: config.coingecko_api_key.clone(),
        ..EnricherConfig::default()
    };
    let fx = FxConfig {
        ttl: config.fx_ttl,
        ..FxConfig::default()
    };
    let aggregator = Arc::new(SnapshotAggregator::new(
        Sources::live(upstream, enricher, fx),
        cache,
        AggregatorConfig {
            snapshot_ttl: config.snapshot_ttl,
            ..AggregatorConfig::default()
        },
    ));

    let hub = Arc::new(ClientRegistry::new());
    let ingest = Arc::new(IngestSupervisor::new(
        hub.clone(),
        aggregator.clone(),
        IngestConfig {
            ws_url: config.bithumb_ws_url.clone(),
            manager: WsManagerConfig {
                read_timeout: config.ingest_read_timeout,
                max_missed_reads: config.ingest_max_missed_reads,
                platform_label: "bithumb".to_string(),
                ..WsManagerConfig::default()
            },
            watch_interval: config.watch_interval,
        },
    ));

    let purge_aggregator = aggregator.clone();
    let purge_handle = tokio::spawn(async move {
        let mut ticker = interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = purge_aggregator.purge_expired();
            if purged > 0 {
                debug!("Purged {} expired valuations", purged);
            }
        }
    });

    let state = Arc::new(AppState {
        hub,
        aggregator,
        ingest: ingest.clone(),
    });
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down ingester...");
    ingest.shutdown().await;
    purge_handle.abort();

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
