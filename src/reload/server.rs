//! Live-reload server
//!
//! An axum router on a tokio runtime owned by [`ReloadServer`]. Every
//! WebSocket client subscribes to a broadcast channel; a reload is one send
//! on that channel. Dropping the server stops it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::runtime::{self, Runtime};
use tokio::sync::{broadcast, Notify};
use tower_http::cors::CorsLayer;

use super::protocol::{self, ChangedBody, ChangedQuery, ServerMessage};

/// Reloads a slow client may fall behind before it skips ahead
const CHANNEL_CAPACITY: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("Failed to bind live-reload port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Live-reload server error: {0}")]
    Io(#[from] io::Error),
}

/// Fan-out of reload messages to connected WebSocket clients
#[derive(Debug, Clone)]
struct Broadcaster {
    reloads: broadcast::Sender<String>,
}

impl Broadcaster {
    fn new() -> Self {
        let (reloads, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { reloads }
    }

    /// Sends a reload for `path` to every client; returns how many got it
    fn reload(&self, path: &str) -> usize {
        // an error only means nobody is listening
        self.reloads.send(ServerMessage::reload(path).to_json()).unwrap_or(0)
    }

    fn client_count(&self) -> usize {
        self.reloads.receiver_count()
    }
}

pub struct ReloadServer {
    addr: SocketAddr,
    broadcaster: Broadcaster,
    shutdown: Arc<Notify>,
    runtime: Option<Runtime>,
}

impl ReloadServer {
    /// Binds `127.0.0.1:<port>` and starts serving; port 0 picks a free one
    pub fn start(port: u16) -> Result<Self, ReloadError> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("themekit-reload")
            .enable_all()
            .build()?;

        let listener = runtime
            .block_on(TcpListener::bind(("127.0.0.1", port)))
            .map_err(|source| ReloadError::Bind { port, source })?;
        let addr = listener.local_addr()?;

        let broadcaster = Broadcaster::new();
        let shutdown = Arc::new(Notify::new());
        let router = build_router(broadcaster.clone());

        let stop = Arc::clone(&shutdown);
        runtime.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.notified().await })
                .await
        });

        Ok(Self {
            addr,
            broadcaster,
            shutdown,
            runtime: Some(runtime),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Tells every connected client that `path` changed
    pub fn notify(&self, path: &str) -> usize {
        self.broadcaster.reload(path)
    }

    pub fn client_count(&self) -> usize {
        self.broadcaster.client_count()
    }
}

impl Drop for ReloadServer {
    fn drop(&mut self) {
        self.shutdown.notify_one();
        if let Some(runtime) = self.runtime.take() {
            // open WebSocket sessions are cut off after the grace period
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}

fn build_router(broadcaster: Broadcaster) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/livereload.js", get(client_script))
        .route("/livereload", get(livereload))
        .route("/changed", get(changed_by_query).post(changed_by_body))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(broadcaster)
}

async fn status() -> impl IntoResponse {
    Json(serde_json::json!({
        "tinylr": "Welcome",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn client_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], protocol::CLIENT_SCRIPT)
}

async fn changed_by_query(
    State(broadcaster): State<Broadcaster>,
    Query(query): Query<ChangedQuery>,
) -> impl IntoResponse {
    broadcast_changed(&broadcaster, protocol::changed_files(query, ChangedBody::default()))
}

async fn changed_by_body(
    State(broadcaster): State<Broadcaster>,
    Query(query): Query<ChangedQuery>,
    Json(body): Json<ChangedBody>,
) -> impl IntoResponse {
    broadcast_changed(&broadcaster, protocol::changed_files(query, body))
}

fn broadcast_changed(broadcaster: &Broadcaster, files: Vec<String>) -> Json<serde_json::Value> {
    let mut clients = broadcaster.client_count();
    for file in &files {
        clients = broadcaster.reload(file);
    }
    Json(serde_json::json!({ "clients": clients, "files": files }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn livereload(ws: WebSocketUpgrade, State(broadcaster): State<Broadcaster>) -> impl IntoResponse {
    // subscribe before the handshake completes so no reload is missed
    let reloads = broadcaster.reloads.subscribe();
    ws.on_upgrade(move |socket| serve_client(socket, reloads))
}

/// One protocol v7 session; returning drops the subscription
async fn serve_client(mut socket: WebSocket, mut reloads: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = protocol::reply_to(text.as_str()) {
                        if socket.send(Message::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            outgoing = reloads.recv() => match outgoing {
                Ok(message) => {
                    if socket.send(Message::Text(message.into())).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}
