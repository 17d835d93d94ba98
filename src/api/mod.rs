pub mod alerts;
pub mod error;
pub mod responders;

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::alerts::{AlertManager, ResponderDirectory};
use crate::hub::socket::serve_socket;
use crate::hub::ConnectionRegistry;

pub use error::ApiError;

/// Shared handles every route needs.
#[derive(Clone)]
pub struct AppState {
    pub manager: AlertManager,
    pub registry: ConnectionRegistry,
    pub directory: Arc<ResponderDirectory>,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .merge(alerts::routes())
        .merge(responders::routes())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.registry.connection_count(),
    }))
}

/// GET /ws - upgrade into a registry-managed connection
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let registry = state.registry.clone();
    let buffer = state.outbound_buffer;
    ws.on_upgrade(move |socket| serve_socket(socket, registry, buffer))
}
