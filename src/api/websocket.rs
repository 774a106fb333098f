use axum::{
    extract::ws::{WebSocket, WebSocketUpgrade, Message},
    response::Response,
    extract::State,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use crate::api::rest::ApiState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();
    let broadcaster = state.broadcaster.clone();
    let (id, mut outbound) = broadcaster.subscribe();

    // Drain this subscriber's queue (snapshot, ticks, pings) into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Client frames: only pong and close mean anything
    let reader = broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => reader.mark_alive(id),
                Message::Close(_) => break,
                Message::Text(text) => {
                    tracing::debug!("Ignoring client message from {}: {}", id, text);
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    broadcaster.unsubscribe(id);
}
