pub mod messages;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

use parley_gateway::Hub;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub hub: Hub,
}

/// REST surface. Everything except `/health` needs a bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/rooms/{room_id}/messages", post(messages::send_message))
        .route("/rooms/{room_id}/read", post(messages::mark_read))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/messages/{message_id}/restore", post(messages::restore_message))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "live_sessions": state.hub.registry().live_sessions(),
    }))
}
