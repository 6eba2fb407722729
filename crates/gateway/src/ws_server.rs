//! HTTP and WebSocket server using Axum.

use crate::api;
use crate::client::{ClientRegistry, ClientState, SubscriberPhase, CLIENT_CHANNEL_BUFFER_SIZE};
use crate::error::{GatewayError, Result};
use crate::ingest::IngestSupervisor;
use crate::protocol::{ClientMessage, ServerMessage};
use aggregator::SnapshotAggregator;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application state, built once in `main`.
pub struct AppState {
    pub hub: Arc<ClientRegistry>,
    pub aggregator: Arc<SnapshotAggregator>,
    pub ingest: Arc<IngestSupervisor>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/coins", get(api::list_coins))
        .route("/api/coins/{symbol}", get(api::coin_detail))
        .route("/api/orderbook/{symbol}", get(api::orderbook))
        .route("/api/markets", get(api::markets))
        .route("/api/chart/{symbol}", get(api::chart))
        .route("/api/exchange-rate", get(api::exchange_rate))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.hub.client_count(),
        "ingesterRunning": state.ingest.is_running().await,
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Seed the client with the current snapshot and register it with the hub.
async fn admit_client(state: &AppState, client: Arc<ClientState>) -> Result<()> {
    let snapshot = state.aggregator.get_snapshot().await;
    let initial = ServerMessage::InitialSnapshot {
        data: snapshot.data.clone(),
    };
    state.hub.admit(client, &initial)?;
    Ok(())
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(CLIENT_CHANNEL_BUFFER_SIZE);

    let client = Arc::new(ClientState::new(tx));
    let client_id = client.id;

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    if let Err(e) = admit_client(&state, client.clone()).await {
        warn!("Client {} rejected: {}", client_id, e);
        send_task.abort();
        return;
    }
    counter!("gateway_connections_total").increment(1);
    info!("Client {} connected", client_id);

    state.ingest.on_subscriber_joined().await;

    let mut ping_interval = interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(msg)) => {
                        if let Err(e) = handle_message(&client, msg) {
                            warn!("Error handling message from {}: {}", client_id, e);
                            let _ = client.send(&ServerMessage::Error {
                                message: e.to_string(),
                                code: "PROCESSING_ERROR".to_string(),
                            });
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if client.phase() == SubscriberPhase::Failed || !state.hub.contains(&client_id) {
                    break;
                }
                if !client.try_send_raw(Message::Ping(Vec::new().into())) {
                    break;
                }
            }
        }
    }

    state.hub.unregister(&client_id);
    state.ingest.on_subscriber_left().await;
    send_task.abort();

    counter!("gateway_disconnections_total").increment(1);
    info!("Client {} disconnected", client_id);
}

fn handle_message(client: &ClientState, msg: Message) -> Result<()> {
    match msg {
        Message::Text(text) => {
            let client_msg: ClientMessage = serde_json::from_str(text.as_str())?;
            handle_client_message(client, client_msg)
        }
        Message::Binary(data) => {
            let client_msg: ClientMessage = serde_json::from_slice(&data)?;
            handle_client_message(client, client_msg)
        }
        Message::Ping(data) => {
            if client.try_send_raw(Message::Pong(data)) {
                Ok(())
            } else {
                Err(GatewayError::ChannelSend)
            }
        }
        Message::Pong(_) | Message::Close(_) => Ok(()),
    }
}

fn handle_client_message(client: &ClientState, msg: ClientMessage) -> Result<()> {
    match msg {
        ClientMessage::Ping => client.send(&ServerMessage::Pong),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use external_services::HttpResponse;

    fn client() -> (Arc<ClientState>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientState::new(tx)), rx)
    }

    fn text(msg: Message) -> serde_json::Value {
        match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admit_seeds_with_snapshot() {
        let parts = parts(http().route(TICKER_ALL, HttpResponse::with_status(500, "")));
        let state = parts.state();
        let (client, mut rx) = client();

        admit_client(&state, client.clone()).await.unwrap();
        assert!(state.hub.contains(&client.id));

        let seed = text(rx.try_recv().unwrap());
        assert_eq!(seed["type"], "initial_snapshot");
        assert_eq!(seed["data"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_application_ping_gets_pong() {
        let (client, mut rx) = client();
        handle_message(&client, Message::Text(r#"{"type":"ping"}"#.to_string().into())).unwrap();
        assert_eq!(text(rx.try_recv().unwrap())["type"], "pong");
    }

    #[test]
    fn test_unknown_message_is_an_error() {
        let (client, _rx) = client();
        let err = handle_message(&client, Message::Text(r#"{"type":"subscribe"}"#.to_string().into())).unwrap_err();
        assert!(matches!(err, GatewayError::Json(_)));
    }

    #[tokio::test]
    async fn test_health_reports_clients_and_ingester() {
        let parts = parts(http());
        let state = parts.state();
        let (client, _rx) = client();
        state.hub.register(client);

        let response = health_handler(State(state)).await.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["clients"], 1);
        assert_eq!(json["ingesterRunning"], false);
    }
}
