//! HTTP surface of the relay.
//!
//! - `GET /ws` upgrades to a WebSocket and hands the socket to a
//!   [`ConnectionPump`] for its whole lifetime.
//! - `GET /health` reports liveness and the connected peer count.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::connection::WsConnection;
use super::hub::HubHandle;
use super::pump::{ConnectionPump, PumpConfig};
use crate::ports::Registry;

/// State shared by every request.
#[derive(Clone)]
pub struct WebSocketState {
    pub hub: HubHandle,
    pub pump_config: PumpConfig,
}

impl WebSocketState {
    pub fn new(hub: HubHandle, pump_config: PumpConfig) -> Self {
        Self { hub, pump_config }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub connected_peers: usize,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
///
/// Oversized frames are rejected by the transport before they reach the pump.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    let max = state.pump_config.max_message_size;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs one connection until both of its loops finish.
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let registry: Arc<dyn Registry> = Arc::new(state.hub.downgrade());
    let pump = ConnectionPump::new(WsConnection::new(socket), registry, state.pump_config.clone());
    let pump_id = *pump.id();

    let running = match pump.start().await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(pump_id = %pump_id, "Failed to register connection: {}", e);
            return;
        }
    };

    tracing::debug!(pump_id = %pump_id, "Connection pump started");
    if let Err(e) = running.join().await {
        tracing::error!(pump_id = %pump_id, "Connection pump task failed: {}", e);
    }
}

/// Handle health checks.
///
/// Route: `GET /health`
pub async fn health(State(state): State<WebSocketState>) -> Response {
    match state.hub.connected_count().await {
        Ok(connected_peers) => Json(HealthResponse {
            status: "ok",
            connected_peers,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "hub unavailable").into_response()
        }
    }
}

/// Create the relay router.
pub fn relay_router(state: WebSocketState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
