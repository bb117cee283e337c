//! WebSocket observer endpoint.
//!
//! GET /ws?role=<group>
//!
//! Each connection registers one hub observer. A writer task forwards the
//! observer's channel to the socket; the reader loop only watches for the
//! client going away. Whichever side finishes first ends the session and the
//! observer is unregistered.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use hub::EventHub;
use serde::Deserialize;
use store::Store;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Group to join. Without one the observer only receives broadcasts.
    pub role: Option<String>,
}

/// GET /ws
pub async fn handle<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let group = params
        .role
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| session(socket, hub, group))
}

async fn session(socket: WebSocket, hub: EventHub, group: Option<String>) {
    let (id, mut rx) = hub.subscribe(group.clone());
    let (mut sink, mut stream) = socket.split();
    tracing::info!(observer = %id, group = ?group, "websocket connected");

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(Message::Text(message.to_string().into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    hub.unregister(id);
    tracing::info!(observer = %id, "websocket disconnected");
}
