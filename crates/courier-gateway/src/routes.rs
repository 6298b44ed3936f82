//! HTTP surface of the gateway.
//!
//! Besides the WebSocket endpoint and a health check, the gateway exposes
//! the two primitives the REST mutation layer calls after its own
//! transaction commits:
//!
//! - `POST /internal/messages` - full pipeline: persist, then relay
//! - `POST /internal/messages/relay` - relay an already-persisted message
//! - `POST /internal/notifications` - fan a notification out to a user
//!
//! The `/internal` routes are expected to be reachable only from the
//! product's own network, like the rest of the service mesh.

use crate::metrics;
use crate::session::ws_handler;
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use courier_store::{Message, NewMessage, Notification, StoreError};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(
    config: crate::config::Config,
    store: courier_store::SharedStore,
    verifier: courier_store::SharedVerifier,
) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone(), store, verifier));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = build_router(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Courier gateway listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/internal/messages", post(send_message_handler))
        .route("/internal/messages/relay", post(relay_message_handler))
        .route("/internal/notifications", post(push_notification_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Persist a message and relay the canonical object.
async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Json(message): Json<NewMessage>,
) -> Response {
    match state.pipeline.send_message(message).await {
        Ok(message) => (StatusCode::CREATED, Json(message)).into_response(),
        Err(e) => store_error_response(&e),
    }
}

/// Relay a message the caller has already persisted.
async fn relay_message_handler(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Message>,
) -> Response {
    let delivered = state.pipeline.relay(&message);
    Json(serde_json::json!({ "delivered": delivered })).into_response()
}

#[derive(Debug, Deserialize)]
struct PushNotificationRequest {
    user_id: String,
    #[serde(flatten)]
    notification: Notification,
}

/// Fan a notification out to the target user's devices.
async fn push_notification_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PushNotificationRequest>,
) -> Response {
    let delivered = state
        .notifier
        .push_notification(&request.user_id, request.notification);
    Json(serde_json::json!({ "delivered": delivered })).into_response()
}

fn store_error_response(error: &StoreError) -> Response {
    let status = if error.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}
