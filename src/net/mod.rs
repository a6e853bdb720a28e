//! HTTP/WebSocket transport (spec §6 External Interfaces), thin routing
//! over `registry`/`hub` — no protocol logic lives here beyond decoding
//! and dispatching.

mod bootstrap;
mod session;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::registry::Registry;

pub struct AppState {
    pub registry: Registry,
    pub settings: Arc<Settings>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/resource/room", post(bootstrap::create_room))
        .route("/resource/room/:room_id", get(bootstrap::get_room))
        .route("/resource/intro.js", get(bootstrap::intro_js))
        .route("/resource/room/:room_id/ws", get(session::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
