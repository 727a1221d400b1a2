//! Axum WebSocket server: one connection owns one isolated session.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use vitrine_core::evidence::EvidenceKind;
use vitrine_core::protocol::{ClientMessage, ServerMessage};

use crate::registry::SessionRegistry;
use crate::session::{Session, SessionConfig};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Outbound message queue per connection. The frame relay awaits on
    /// this queue, so its depth bounds how far a slow client can lag.
    pub max_send_queue: usize,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            max_send_queue: 256,
            session: SessionConfig::default(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(SessionRegistry::new());
    let state = AppState {
        config: Arc::new(config.clone()),
        registry: Arc::clone(&registry),
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "vitrine server started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        _server: server,
    })
}

/// Handle returned by `start()` — keeps the accept loop alive and owns
/// the session registry for shutdown.
pub struct ServerHandle {
    pub port: u16,
    registry: Arc<SessionRegistry>,
    _server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn active_sessions(&self) -> usize {
        self.registry.count()
    }

    /// Close every live session. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        self.registry.close_all().await
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    /// Requested start page; the session falls back to the configured
    /// default when absent.
    url: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.url))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "active_sessions": state.registry.count(),
    }))
}

/// One WebSocket connection, one session, from setup to teardown.
async fn handle_socket(socket: WebSocket, state: AppState, requested_url: Option<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(state.config.max_send_queue);

    // Writer task: everything outbound (frames, acks, errors) funnels
    // through one channel onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let session = match Session::open(&state.config.session, requested_url, out_tx.clone()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "session setup failed, closing connection");
            let _ = out_tx
                .send(ServerMessage::Error {
                    message: e.to_string(),
                })
                .await;
            drop(out_tx);
            let _ = writer.await;
            return;
        }
    };
    tracing::info!(session_id = %session.id(), "client connected");
    state.registry.insert(Arc::clone(&session));

    // Intents apply in receipt order; a broken read stream is the fatal
    // relay failure that triggers teardown.
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            WsMessage::Text(text) => {
                let intent: ClientMessage = match serde_json::from_str(&text) {
                    Ok(intent) => intent,
                    Err(e) => {
                        tracing::debug!(
                            session_id = %session.id(),
                            error = %e,
                            "unparseable client message ignored"
                        );
                        continue;
                    }
                };
                route_intent(&session, intent, &out_tx).await;
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    state.registry.remove(session.id());
    session.close().await;
    drop(out_tx);
    let _ = writer.await;
    tracing::info!(session_id = %session.id(), "client disconnected");
}

/// Evidence requests run off the read loop so a slow capture never
/// stalls input handling; everything else goes through the input relay.
async fn route_intent(
    session: &Arc<Session>,
    intent: ClientMessage,
    out_tx: &mpsc::Sender<ServerMessage>,
) {
    let kind = match intent {
        ClientMessage::EvidenceSnapshot => Some(EvidenceKind::Snapshot),
        ClientMessage::EvidenceDocument => Some(EvidenceKind::Document),
        _ => None,
    };

    if let Some(kind) = kind {
        let session = Arc::clone(session);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let msg = match session.evidence().capture(kind).await {
                Ok(entry) => ServerMessage::EvidenceAck { entry },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            };
            let _ = out_tx.send(msg).await;
        });
        return;
    }

    if let Err(e) = session.input().handle(intent).await {
        // handle() already logged; dispatch failures are isolated
        tracing::debug!(session_id = %session.id(), error = %e, "intent not dispatched");
    }
}
