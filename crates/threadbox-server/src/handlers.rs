//! HTTP and WebSocket handlers for the threadbox server.
//!
//! `POST /ingest` is an inbound transport: payloads are queued on an
//! in-process channel and a delivery pump files them into the router. The
//! remaining routes are a presentation surface over the router.

use crate::config::Config;
use crate::metrics::{self, ObserverMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use threadbox_core::{now_millis, Message, MessageRouter, Notification, ViewNotificationPort};
use threadbox_transport::{memory, pump, DeliveryHandler, Publisher};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The thread router.
    pub router: Arc<MessageRouter>,
    /// Ingestion queue feeding the router.
    pub publisher: Publisher,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create the router and start the delivery pump feeding it.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let router = Arc::new(MessageRouter::new());
        let (publisher, subscriber) = memory::channel(config.ingest.queue_capacity);

        let handler = MeteredIngest {
            router: Arc::clone(&router),
        };
        tokio::spawn(async move {
            match pump(subscriber, handler).await {
                Ok(delivered) => info!(delivered, "Ingestion stopped"),
                Err(e) => {
                    error!(error = %e, "Ingestion failed");
                    metrics::record_error("ingest");
                }
            }
        });

        Self {
            router,
            publisher,
            config,
        }
    }
}

/// Delivery handler that ingests and records metrics.
struct MeteredIngest {
    router: Arc<MessageRouter>,
}

impl DeliveryHandler for MeteredIngest {
    fn on_delivery(&self, topic: &str, payload: &[u8]) {
        let ingested = self.router.ingest(payload, topic, now_millis());
        metrics::record_message(payload.len(), ingested.delivered_live);
        if ingested.is_new_thread {
            debug!(topic = %topic, "New thread");
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
        spawn_gauge_sampler(
            Arc::clone(&state.router),
            Duration::from_millis(config.metrics.sample_interval_ms),
        );
    }

    let app = app(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("threadbox listening on {}", addr);
    info!(
        "Notification endpoint: ws://{}{}",
        addr, config.notifications.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.notifications.websocket_path.clone();
    let body_limit = state.config.ingest.max_payload_size;

    Router::new()
        .route("/health", get(health_handler))
        .route("/ingest", post(ingest_handler))
        .route("/threads", get(list_threads_handler).delete(remove_thread_handler))
        .route("/threads/messages", get(thread_handler))
        .route("/threads/read", post(mark_read_handler))
        .route("/views/open", post(open_view_handler))
        .route("/views/close", post(close_view_handler))
        .route(&ws_path, get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn spawn_gauge_sampler(router: Arc<MessageRouter>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            metrics::record_router(&router.stats());
        }
    });
}

/// Topic selector, as a query string or JSON body.
#[derive(Debug, Deserialize)]
pub struct TopicParam {
    pub topic: String,
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Queue a raw payload for ingestion.
async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Query(TopicParam { topic }): Query<TopicParam>,
    payload: Bytes,
) -> Response {
    if topic.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "topic must not be empty" })),
        )
            .into_response();
    }

    match state.publisher.publish(topic, payload).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            warn!(error = %e, "Ingestion queue unavailable");
            metrics::record_error("ingest");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn list_threads_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.thread_summaries())
}

async fn thread_handler(
    State(state): State<Arc<AppState>>,
    Query(TopicParam { topic }): Query<TopicParam>,
) -> Response {
    match state.router.thread(&topic) {
        Some(thread) => Json(thread).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn remove_thread_handler(
    State(state): State<Arc<AppState>>,
    Query(TopicParam { topic }): Query<TopicParam>,
) -> Response {
    match state.router.remove_thread(&topic) {
        Some(thread) => {
            info!(topic = %topic, messages = thread.len(), "Thread removed");
            Json(thread).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Json(TopicParam { topic }): Json<TopicParam>,
) -> impl IntoResponse {
    let marked = state.router.mark_read(&topic);
    Json(serde_json::json!({ "topic": topic, "marked": marked }))
}

async fn open_view_handler(
    State(state): State<Arc<AppState>>,
    Json(TopicParam { topic }): Json<TopicParam>,
) -> impl IntoResponse {
    Json(state.router.open_view(&topic))
}

async fn close_view_handler(
    State(state): State<Arc<AppState>>,
    Json(TopicParam { topic }): Json<TopicParam>,
) -> impl IntoResponse {
    Json(state.router.close_view(&topic))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Forwards router notifications to a socket task.
struct SocketPort {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ViewNotificationPort for SocketPort {
    fn thread_list_changed(&self) {
        let _ = self.tx.send(Notification::ThreadListChanged);
    }

    fn thread_appended(&self, topic: &str, message: &Message) {
        let _ = self.tx.send(Notification::ThreadAppended {
            topic: topic.to_string(),
            message: message.clone(),
        });
    }
}

/// Push notifications to a WebSocket client until it goes away.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ObserverMetricsGuard::new();

    let (tx, mut notifications) = mpsc::unbounded_channel();
    let observer = state.router.subscribe();
    let observer_id = observer.id();
    let observer_task = observer.spawn(SocketPort { tx });

    debug!(observer = observer_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // A fresh surface starts by reading the list
    if send_notification(&mut sender, &Notification::ThreadListChanged)
        .await
        .is_err()
    {
        observer_task.abort();
        return;
    }

    loop {
        tokio::select! {
            Some(notification) = notifications.recv() => {
                if let Err(e) = send_notification(&mut sender, &notification).await {
                    debug!(observer = observer_id, error = %e, "Notification send failed");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Clients talk to the router over HTTP
                    }
                    Some(Err(e)) => {
                        warn!(observer = observer_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                }
            }
        }
    }

    observer_task.abort();
    debug!(observer = observer_id, "WebSocket disconnected");
}

/// Send a notification as a JSON text frame.
async fn send_notification(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    notification: &Notification,
) -> Result<()> {
    let text = serde_json::to_string(notification)?;
    sender.send(WsMessage::Text(text)).await?;
    Ok(())
}
