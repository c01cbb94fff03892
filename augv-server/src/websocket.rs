// WebSocket handlers for agent streams and monitors

use crate::broadcast::{ChannelSink, MonitorSink};
use crate::http::{AppState, ErrorResponse};
use augv_core::AgentId;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// `/ws/augv/:agent_id`
pub async fn agent_ws_handler(
    ws: WebSocketUpgrade,
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let agent_id = match AgentId::new(agent_id) {
        Ok(id) => id,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(e.to_string(), "invalid_agent_id")),
            )
                .into_response()
        }
    };
    ws.on_upgrade(move |socket| handle_agent_socket(socket, state, agent_id))
}

async fn handle_agent_socket(mut socket: WebSocket, state: AppState, agent_id: AgentId) {
    state.ingestor.connect(&agent_id);

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Binary(data)) => {
                if let Err(e) = state.ingestor.ingest_encoded(&agent_id, Bytes::from(data)).await {
                    warn!("[AUGV {}] frame decode error: {}", agent_id, e);
                }
            }
            Ok(Message::Text(_)) => {
                debug!("[AUGV {}] Ignoring text message", agent_id);
            }
            Ok(Message::Close(_)) => {
                info!("[AUGV {}] disconnected", agent_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("[AUGV {}] disconnected: {}", agent_id, e);
                break;
            }
        }
    }

    state.ingestor.disconnect(&agent_id);
}

/// `/ws/monitor`
pub async fn monitor_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_monitor_socket(socket, state))
}

async fn handle_monitor_socket(socket: WebSocket, state: AppState) {
    let monitor = &state.config.monitor;
    let (tx, mut rx) = mpsc::channel::<Bytes>(monitor.queue_depth);
    let sink = Arc::new(ChannelSink::new(tx, monitor.send_timeout()));

    let hub = state.ingestor.hub().clone();
    let subscriber_id = match hub.subscribe(sink.clone()) {
        Ok(id) => id,
        Err(e) => {
            warn!("[MONITOR] rejected: {}", e);
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();

    // Writer: queued payloads, plus a ping whenever the connection has been quiet
    let heartbeat = monitor.heartbeat_interval();
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
        loop {
            tokio::select! {
                payload = rx.recv() => {
                    let Some(payload) = payload else { break };
                    if let Err(e) = sender.send(Message::Binary(payload.to_vec())).await {
                        debug!("[MONITOR] send failed: {}", e);
                        break;
                    }
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    for payload in state.ingestor.initial_payloads() {
        if let Err(e) = sink.deliver(payload).await {
            warn!("[MONITOR] failed to send initial frame: {}", e);
            break;
        }
    }
    drop(sink);

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("[MONITOR] receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            debug!("[MONITOR] writer finished for {}", subscriber_id);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("[MONITOR] reader finished for {}", subscriber_id);
            send_task.abort();
        }
    }

    hub.unsubscribe(&subscriber_id);
}
