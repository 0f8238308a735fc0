use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bias_core::SubscriptionEvent;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::state::AppState;

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/subscribe", get(subscribe_handler))
}

async fn subscribe_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscribe_socket(socket, state))
}

/// Handshake payload: the topics to follow, plus an optional per-topic
/// `since_sequence` to resume from (§6's "optional since_sequence per
/// topic"). Anything at or before `since` is replayed from the durable
/// log before live fan-out begins.
#[derive(Deserialize)]
struct SubscribeRequest {
    topics: Vec<String>,
    #[serde(default)]
    since: HashMap<String, i64>,
}

async fn handle_subscribe_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(Ok(Message::Text(text))) = receiver.next().await else {
        return;
    };
    let Ok(req) = serde_json::from_str::<SubscribeRequest>(&text) else {
        let _ = sender
            .send(Message::Text(serde_json::json!({"error": "invalid subscribe handshake"}).to_string()))
            .await;
        return;
    };

    // Every subscribed topic forwards into one mpsc channel; the single
    // consumer end preserves commit order per topic (the source the
    // multiplexed stream is ultimately fed from) while letting the client
    // follow several topics over one socket.
    let (tx, mut rx) = tokio::sync::mpsc::channel::<SubscriptionEvent>(256);

    for topic in &req.topics {
        if let Some(since_seq) = req.since.get(topic).copied() {
            if let Ok(entries) = state.fabric.since(topic, since_seq).await {
                for entry in entries {
                    let event = SubscriptionEvent { topic: entry.topic, sequence: entry.sequence as u64, payload: entry.payload };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }

        let mut topic_rx = state.fabric.subscribe(topic);
        let forward_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match topic_rx.recv().await {
                    Ok(event) => {
                        if forward_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
    drop(tx);

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}
