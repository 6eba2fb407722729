//! Ingest supervisor: owns the single upstream stream worker and the
//! instrument-set watcher.
//!
//! Both start when the first subscriber arrives and stop when the last one
//! leaves. A worker that gave up reconnecting is restarted by the next
//! subscriber arrival or watcher pass.

use crate::client::ClientRegistry;
use crate::protocol::ServerMessage;
use aggregator::{SnapshotAggregator, SnapshotSource};
use bithumb::BithumbTickerHandler;
use common::{ControlCommand, WsManager, WsManagerConfig};
use external_services::bithumb::WS_URL;
use metrics::{counter, gauge};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub ws_url: String,
    pub manager: WsManagerConfig,
    /// Period of the instrument-set watcher.
    pub watch_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ws_url: WS_URL.to_string(),
            manager: WsManagerConfig {
                platform_label: "bithumb".to_string(),
                ..Default::default()
            },
            watch_interval: Duration::from_secs(30),
        }
    }
}

/// A running worker with its control channel.
struct WorkerHandle {
    worker_id: String,
    command_tx: mpsc::Sender<ControlCommand>,
    join_handle: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        !self.join_handle.is_finished()
    }
}

#[derive(Default)]
struct IngestState {
    worker: Option<WorkerHandle>,
    watcher: Option<JoinHandle<()>>,
    /// Last symbol set broadcast and handed to the worker.
    tracked: Vec<String>,
}

pub struct IngestSupervisor {
    hub: Arc<ClientRegistry>,
    aggregator: Arc<SnapshotAggregator>,
    config: IngestConfig,
    state: Mutex<IngestState>,
    worker_counter: AtomicU64,
}

impl IngestSupervisor {
    pub fn new(
        hub: Arc<ClientRegistry>,
        aggregator: Arc<SnapshotAggregator>,
        config: IngestConfig,
    ) -> Self {
        Self {
            hub,
            aggregator,
            config,
            state: Mutex::new(IngestState::default()),
            worker_counter: AtomicU64::new(0),
        }
    }

    pub async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state.worker.as_ref().is_some_and(WorkerHandle::is_alive)
    }

    pub async fn tracked(&self) -> Vec<String> {
        self.state.lock().await.tracked.clone()
    }

    /// Workers spawned since startup.
    pub fn workers_spawned(&self) -> u64 {
        self.worker_counter.load(Ordering::Relaxed)
    }

    /// Start the worker and watcher if they are not running.
    pub async fn on_subscriber_joined(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.worker.as_ref().is_some_and(WorkerHandle::is_alive) {
            return;
        }

        let snapshot = self.aggregator.get_snapshot().await;
        state.tracked = snapshot.symbols();
        self.spawn_worker(&mut state);

        if state.watcher.is_none() {
            state.watcher = Some(self.spawn_watcher());
        }
    }

    /// Stop everything once no subscriber is left.
    pub async fn on_subscriber_left(&self) {
        if self.hub.client_count() > 0 {
            return;
        }
        let mut state = self.state.lock().await;
        if self.hub.client_count() == 0 {
            self.stop_locked(&mut state);
        }
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state);
    }

    fn stop_locked(&self, state: &mut IngestState) {
        if let Some(watcher) = state.watcher.take() {
            watcher.abort();
        }
        if let Some(worker) = state.worker.take() {
            info!("Stopping ingester {}", worker.worker_id);
            if worker.command_tx.try_send(ControlCommand::Shutdown).is_err() {
                worker.join_handle.abort();
            }
        }
        gauge!("ingester_running").set(0.0);
    }

    fn spawn_worker(&self, state: &mut IngestState) {
        let n = self.worker_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let worker_id = format!("bithumb-worker-{}", n);

        info!(
            "Spawning worker {} with {} symbols",
            worker_id,
            state.tracked.len()
        );

        let (command_tx, command_rx) = mpsc::channel::<ControlCommand>(32);
        let handler = Arc::new(BithumbTickerHandler::with_url(
            self.config.ws_url.clone(),
            state.tracked.clone(),
            self.hub.clone(),
            worker_id.clone(),
        ));
        let manager = WsManager::new(
            handler,
            self.config.manager.clone(),
            command_rx,
            worker_id.clone(),
        );

        let id = worker_id.clone();
        let join_handle = tokio::spawn(async move {
            match manager.run().await {
                Ok(()) => info!("[{}] Worker stopped", id),
                Err(e) => warn!("[{}] Worker exited: {}", id, e),
            }
        });

        state.worker = Some(WorkerHandle {
            worker_id,
            command_tx,
            join_handle,
        });
        gauge!("ingester_running").set(1.0);
    }

    fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(this.config.watch_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.refresh().await;
            }
        })
    }

    /// One watcher pass. Broadcasts `instrument_set_changed` and re-targets
    /// the worker when symbol membership changed. Returns whether it did.
    pub async fn refresh(&self) -> bool {
        let snapshot = self.aggregator.get_snapshot().await;
        if snapshot.source == SnapshotSource::Fallback {
            debug!("Skipping watcher pass on fallback snapshot");
            return false;
        }
        let symbols = snapshot.symbols();

        let mut state = self.state.lock().await;
        let (added, removed) = {
            let old: HashSet<&str> = state.tracked.iter().map(String::as_str).collect();
            let new: HashSet<&str> = symbols.iter().map(String::as_str).collect();
            let added: Vec<String> = symbols
                .iter()
                .filter(|s| !old.contains(s.as_str()))
                .cloned()
                .collect();
            let removed: Vec<String> = state
                .tracked
                .iter()
                .filter(|s| !new.contains(s.as_str()))
                .cloned()
                .collect();
            (added, removed)
        };

        let changed = !added.is_empty() || !removed.is_empty();
        if changed {
            info!(
                "Instrument set changed: +{} -{}",
                added.len(),
                removed.len()
            );
            counter!("instrument_set_changes_total").increment(1);
            self.hub.publish(&ServerMessage::InstrumentSetChanged {
                data: snapshot.data.clone(),
            });
            state.tracked = symbols;

            if let Some(worker) = state.worker.as_ref().filter(|w| w.is_alive()) {
                if !added.is_empty() {
                    let _ = worker.command_tx.send(ControlCommand::Subscribe(added)).await;
                }
                if !removed.is_empty() {
                    let _ = worker
                        .command_tx
                        .send(ControlCommand::Unsubscribe(removed))
                        .await;
                }
            }
        }

        let worker_alive = state.worker.as_ref().is_some_and(WorkerHandle::is_alive);
        if !worker_alive && self.hub.client_count() > 0 {
            info!("Restarting ingester on watcher pass");
            self.spawn_worker(&mut state);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientState;
    use crate::test_support::*;
    use axum::extract::ws::Message;
    use external_services::HttpResponse;

    fn tickers(symbols: &[(&str, &str)]) -> HttpResponse {
        let body: Vec<String> = symbols
            .iter()
            .map(|(s, p)| format!(r#""{}":{{"closing_price":"{}"}}"#, s, p))
            .collect();
        HttpResponse::ok(format!(r#"{{"status":"0000","data":{{{}}}}}"#, body.join(",")))
    }

    fn subscriber(hub: &ClientRegistry) -> (crate::client::ClientId, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let id = hub.register(Arc::new(ClientState::new(tx)));
        (id, rx)
    }

    #[tokio::test]
    async fn test_first_subscriber_starts_last_stops() {
        let parts = parts(http().route(TICKER_ALL, tickers(&[("BTC", "1")])));
        let (id, _rx) = subscriber(&parts.hub);

        parts.ingest.on_subscriber_joined().await;
        assert!(parts.ingest.is_running().await);
        assert_eq!(parts.ingest.tracked().await, vec!["BTC"]);

        parts.ingest.on_subscriber_joined().await;
        assert_eq!(parts.ingest.workers_spawned(), 1);

        parts.hub.unregister(&id);
        parts.ingest.on_subscriber_left().await;
        assert!(!parts.ingest.is_running().await);
    }

    #[tokio::test]
    async fn test_refresh_only_reacts_to_membership() {
        let parts = parts(http().route(TICKER_ALL, tickers(&[("BTC", "1"), ("ETH", "2")])));
        let (_id, mut rx) = subscriber(&parts.hub);
        parts.ingest.on_subscriber_joined().await;

        parts.http.set_route(TICKER_ALL, Ok(tickers(&[("ETH", "3"), ("BTC", "5")])));
        assert!(!parts.ingest.refresh().await);
        assert!(rx.try_recv().is_err());

        parts.http.set_route(TICKER_ALL, Ok(tickers(&[("BTC", "5"), ("XRP", "1")])));
        assert!(parts.ingest.refresh().await);
        match rx.try_recv().unwrap() {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(value["type"], "instrument_set_changed");
                assert_eq!(value["data"].as_array().unwrap().len(), 2);
            }
            other => panic!("unexpected frame {:?}", other),
        }

        let mut tracked = parts.ingest.tracked().await;
        tracked.sort();
        assert_eq!(tracked, vec!["BTC", "XRP"]);
        parts.ingest.shutdown().await;
    }

    #[tokio::test]
    async fn test_fallback_snapshot_is_ignored() {
        let parts = parts(http().route(TICKER_ALL, tickers(&[("BTC", "1")])));
        let (_id, _rx) = subscriber(&parts.hub);
        parts.ingest.on_subscriber_joined().await;

        parts.http.set_route(TICKER_ALL, Ok(HttpResponse::with_status(500, "")));
        assert!(!parts.ingest.refresh().await);
        assert_eq!(parts.ingest.tracked().await, vec!["BTC"]);
        parts.ingest.shutdown().await;
    }

    #[tokio::test]
    async fn test_watcher_pass_restarts_given_up_worker() {
        let parts = parts(http().route(TICKER_ALL, tickers(&[("BTC", "1")])));
        let (_id, _rx) = subscriber(&parts.hub);
        parts.ingest.on_subscriber_joined().await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while parts.ingest.is_running().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker should give up against a closed port");

        parts.ingest.refresh().await;
        assert_eq!(parts.ingest.workers_spawned(), 2);
        parts.ingest.shutdown().await;
    }
}
