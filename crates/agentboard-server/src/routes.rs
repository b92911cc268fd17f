//! HTTP surface: live channel, pull endpoint, health

use crate::config::BroadcastConfig;
use crate::hub::{BroadcastHub, DisconnectReason, Subscription};
use crate::messages::{PING, PONG};
use agentboard_observability::{HealthState, Metrics, health_router};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<BroadcastConfig>,
}

pub fn router(state: AppState) -> Router {
    let health = health_router(HealthState::new(state.metrics.clone()));

    Router::new()
        .route("/ws", get(live_channel))
        .route("/api/state", get(current_state))
        .with_state(state)
        .merge(health)
        .layer(TraceLayer::new_for_http())
}

/// One-shot copy of the state the live channel is serving
async fn current_state(State(state): State<AppState>) -> Response {
    let snapshot = state.hub.snapshot();
    match serde_json::to_vec(snapshot.as_ref()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize state: {}", err),
        )
            .into_response(),
    }
}

async fn live_channel(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_viewer(socket, state))
}

/// Drive one viewer from handshake to close.
///
/// Outgoing frames come from the viewer's hub queue; incoming frames are
/// only ever `ping` or close. The idle timer is reset by incoming traffic
/// alone.
async fn serve_viewer(socket: WebSocket, state: AppState) {
    let Subscription { id, mut rx } = match state.hub.attach() {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("Failed to serialize initial state: {}", e);
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();
    let idle_timeout = state.config.idle_timeout();
    let write_timeout = state.config.write_timeout();
    let mut idle_deadline = Instant::now() + idle_timeout;

    let reason = loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if let Err(reason) = send(&mut sender, message, write_timeout).await {
                        break Some(reason);
                    }
                }
                // The hub already removed this viewer
                None => break None,
            },
            incoming = receiver.next() => {
                idle_deadline = Instant::now() + idle_timeout;
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str().trim() == PING {
                            if let Err(reason) = send(&mut sender, Message::Text(Utf8Bytes::from_static(PONG)), write_timeout).await {
                                break Some(reason);
                            }
                        } else {
                            debug!(viewer = %id, "Ignoring viewer text frame");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Some(DisconnectReason::Closed),
                    // Ping and pong frames are answered by the transport
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(viewer = %id, error = %e, "Viewer protocol error");
                        break Some(DisconnectReason::ProtocolError);
                    }
                }
            }
            _ = idle(idle_deadline, idle_timeout) => break Some(DisconnectReason::IdleTimeout),
        }
    };

    if let Some(reason) = reason {
        state.hub.detach(&id, reason);
    }

    if reason != Some(DisconnectReason::Closed) {
        let _ = timeout(write_timeout, sender.send(Message::Close(None))).await;
    }
}

async fn send<S>(sender: &mut S, message: Message, write_timeout: Duration) -> Result<(), DisconnectReason>
where
    S: Sink<Message> + Unpin,
{
    match timeout(write_timeout, sender.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(DisconnectReason::WriteError),
    }
}

/// Idle timer; a zero timeout never fires
async fn idle(deadline: Instant, idle_timeout: Duration) {
    if idle_timeout.is_zero() {
        std::future::pending::<()>().await;
    }
    sleep_until(deadline).await;
}
