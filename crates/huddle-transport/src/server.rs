//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket, runs a reader loop and a writer task
//! per connection, and forwards lifecycle events to a `ConnectionHandler`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use huddle_protocol::iso_timestamp;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionId, ConnectionSender, Frame};
use crate::error::TransportError;

/// How long a closing connection's writer may keep flushing queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Trait implemented by the chat server to react to connection events.
///
/// The transport calls these from each connection's reader loop, one event
/// at a time per connection; different connections call concurrently.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// A WebSocket finished its upgrade. `sender` queues frames to it.
    fn on_open(&self, id: ConnectionId, sender: ConnectionSender);

    /// A text frame arrived.
    fn on_text(&self, id: ConnectionId, text: &str);

    /// The connection closed, cleanly or not.
    fn on_close(&self, id: ConnectionId);

    /// Snapshot for the `/health` endpoint.
    fn status(&self) -> HandlerStatus;
}

/// Connection counts reported by `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStatus {
    /// Every tracked connection, named or not.
    pub connected: usize,
    /// Connections that have registered a display name.
    pub named: usize,
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS on the HTTP routes
    pub enable_cors: bool,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            hostname: "0.0.0.0".into(),
            enable_cors: true,
            max_connections: None,
        }
    }
}

/// Shared state for the transport server.
struct AppState<H: ConnectionHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    /// Open sockets, used only for the connection cap
    active: AtomicUsize,
}

/// The transport server — owns the listener task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound address
    local_addr: SocketAddr,
}

impl TransportServer {
    /// Start the transport server with the given connection handler.
    pub async fn start<H: ConnectionHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        Self::start_with_handler(config, Arc::new(handler)).await
    }

    /// Start the transport server with a shared handler, so the caller can
    /// keep its own reference for inspection.
    pub async fn start_with_handler<H: ConnectionHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let addr_str = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = addr_str.parse().map_err(|source| TransportError::InvalidAddress {
            addr: addr_str.clone(),
            source,
        })?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr: addr_str.clone(), source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr: addr_str, source })?;

        let app = build_router(config, handler);

        info!("Huddle listening on ws://{local_addr}/ws");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
            {
                warn!("Transport server exited with error: {e}");
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            local_addr,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Huddle transport server stopped");
    }
}

/// Build the `/ws` + `/health` router around a handler.
pub fn build_router<H: ConnectionHandler>(config: TransportConfig, handler: Arc<H>) -> Router {
    let enable_cors = config.enable_cors;
    let state = Arc::new(AppState {
        handler,
        config,
        active: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/ws", get(ws_upgrade_handler::<H>))
        .route("/health", get(health_handler::<H>))
        .with_state(state);

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: ConnectionHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    // Check connection limit
    if let Some(max) = state.config.max_connections {
        let current = state.active.load(Ordering::Relaxed);
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler<H: ConnectionHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    let status = state.handler.status();
    Json(json!({
        "status": "ok",
        "connectedUsers": status.connected,
        "namedUsers": status.named,
        "timestamp": iso_timestamp(chrono::Utc::now()),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: ConnectionHandler>(
    socket: WebSocket,
    state: Arc<AppState<H>>,
) {
    state.active.fetch_add(1, Ordering::Relaxed);

    let id = ConnectionId::new();
    info!("Client connected: {id}");

    let (ws_tx, mut ws_rx) = socket.split();
    let (sender, outbound_rx) = ConnectionSender::channel();
    let writer = tokio::spawn(writer_task(ws_tx, outbound_rx, id));

    state.handler.on_open(id, sender.clone());

    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                state.handler.on_text(id, text.as_str());
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = sender.pong(data);
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!("Client disconnected: {id}");
                break;
            }
            Some(Err(e)) => {
                warn!("WebSocket error for {id}: {e}");
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                debug!("Ignoring binary frame from {id}");
            }
            Some(Ok(Message::Pong(_))) => {}
        }
    }

    state.handler.on_close(id);
    drop(sender);

    // The handler has dropped its sender, so the writer drains what is
    // queued and exits. Bound the wait in case the peer stopped reading.
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        abort.abort();
    }

    state.active.fetch_sub(1, Ordering::Relaxed);
    info!("Client disconnected: {id} (open: {})", state.active.load(Ordering::Relaxed));
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Drain queued frames into the socket until every sender is gone or a
/// write fails. Dropping the receiver marks the connection closed for
/// broadcasts still holding a sender.
async fn writer_task(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    id: ConnectionId,
) {
    while let Some(frame) = rx.recv().await {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Pong(data) => Message::Pong(data),
        };
        if let Err(e) = ws_tx.send(msg).await {
            warn!("Failed to write to {id}: {e}");
            return;
        }
    }
    let _ = ws_tx.close().await;
}
