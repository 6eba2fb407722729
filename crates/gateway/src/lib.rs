//! Gateway service for the KRW market view.
//!
//! This service:
//! - Serves the aggregated market snapshot and per-coin views over REST
//! - Accepts WebSocket subscribers and seeds each with the snapshot
//! - Runs one upstream ticker stream while anyone is subscribed
//! - Fans live ticks and instrument-set changes out to every subscriber
//!
//! ## Architecture
//!
//! ```text
//! Bithumb ticker stream
//!         ↓
//! IngestSupervisor (WsManager + BithumbTickerHandler, watcher)
//!         ↓
//! ClientRegistry (DashMap-based broadcast hub)
//!         ↓
//! WebSocket clients
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod protocol;
pub mod ws_server;

pub use client::{ClientId, ClientRegistry, ClientState, SubscriberPhase};
pub use config::Config;
pub use error::{GatewayError, Result};
pub use ingest::{IngestConfig, IngestSupervisor};
pub use protocol::{ClientMessage, ServerMessage};
pub use ws_server::{create_router, AppState};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::client::ClientRegistry;
    use crate::ingest::{IngestConfig, IngestSupervisor};
    use crate::ws_server::AppState;
    use aggregator::{AggregatorConfig, SnapshotAggregator, Sources};
    use common::{RetryPolicy, WsManagerConfig};
    use external_services::{EnricherConfig, FxConfig, NoopCache, StaticHttpClient, UpstreamGateway};
    use std::sync::Arc;
    use std::time::Duration;

    pub const TICKER_ALL: &str = "https://api.bithumb.com/public/ticker/ALL_KRW";

    pub fn http() -> StaticHttpClient {
        StaticHttpClient::new()
    }

    pub struct Parts {
        pub hub: Arc<ClientRegistry>,
        pub aggregator: Arc<SnapshotAggregator>,
        pub ingest: Arc<IngestSupervisor>,
        pub http: Arc<StaticHttpClient>,
    }

    impl Parts {
        pub fn state(&self) -> Arc<AppState> {
            Arc::new(AppState {
                hub: self.hub.clone(),
                aggregator: self.aggregator.clone(),
                ingest: self.ingest.clone(),
            })
        }
    }

    /// Gateway wiring over canned HTTP. Snapshots are never reused and the
    /// stream worker targets a closed local port without retrying.
    pub fn parts(http: StaticHttpClient) -> Parts {
        let http = Arc::new(http);
        let gateway = Arc::new(UpstreamGateway::with_client(http.clone()));
        let enricher = EnricherConfig {
            catalogue_retry: RetryPolicy::none(),
            ..EnricherConfig::default()
        };
        let aggregator = Arc::new(SnapshotAggregator::new(
            Sources::live(gateway, enricher, FxConfig::default()),
            Arc::new(NoopCache),
            AggregatorConfig {
                snapshot_ttl: Duration::ZERO,
                ..AggregatorConfig::default()
            },
        ));

        let hub = Arc::new(ClientRegistry::new());
        let ingest = Arc::new(IngestSupervisor::new(
            hub.clone(),
            aggregator.clone(),
            IngestConfig {
                ws_url: "ws://127.0.0.1:1".to_string(),
                manager: WsManagerConfig {
                    reconnect: RetryPolicy::none(),
                    platform_label: "test".to_string(),
                    ..WsManagerConfig::default()
                },
                watch_interval: Duration::from_secs(3600),
            },
        ));

        Parts {
            hub,
            aggregator,
            ingest,
            http,
        }
    }
}
