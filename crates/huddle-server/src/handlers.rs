//! Connection handlers for the Huddle server.
//!
//! This module bridges WebSocket connections to the relay gateway: it
//! assigns connection ids, decodes inbound frames, and drains each
//! connection's outbound queue back onto the socket.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use huddle_core::{ConnectionHandle, ConnectionId, RelayGateway};
use huddle_protocol::codec;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The relay gateway.
    pub gateway: RelayGateway,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            gateway: RelayGateway::new(),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.gateway.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.open_connections,
        "participants": stats.joined_participants,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
///
/// Inbound events on this connection are processed one at a time; separate
/// connections run in separate tasks.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(connection = %connection_id, "WebSocket connected");

    // The gateway delivers into this queue; the loop below drains it.
    let (handle, mut outbound) =
        ConnectionHandle::channel(state.config.limits.outbound_capacity);
    state.gateway.connect(connection_id.clone(), handle);

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Event processing loop
    loop {
        tokio::select! {
            biased;

            // Outbound events queued by the gateway
            Some(event) = outbound.recv() => {
                match codec::encode(&event) {
                    Ok(text) => {
                        metrics::record_event(text.len(), "outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Failed to encode event");
                        metrics::record_error("encode");
                    }
                }
            }

            // Inbound from the WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > state.config.limits.max_message_size {
                            debug!(
                                connection = %connection_id,
                                size = text.len(),
                                "Oversized inbound event, dropping"
                            );
                            metrics::record_error("oversized");
                            continue;
                        }

                        let start = Instant::now();
                        match codec::decode(&text) {
                            Ok(event) => {
                                metrics::record_event(text.len(), "inbound");
                                state.gateway.dispatch(&connection_id, event);
                                metrics::record_latency(start.elapsed().as_secs_f64());
                                metrics::set_active_participants(state.gateway.online_count());
                            }
                            Err(e) => {
                                // Malformed payloads are dropped; the
                                // connection stays up.
                                debug!(
                                    connection = %connection_id,
                                    error = %e,
                                    "Undecodable inbound event, dropping"
                                );
                                metrics::record_error("decode");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(connection = %connection_id, "Binary frame dropped");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: the gateway unregisters and announces the departure.
    state.gateway.disconnect(&connection_id);
    metrics::set_active_participants(state.gateway.online_count());

    debug!(connection = %connection_id, "WebSocket disconnected");
}
