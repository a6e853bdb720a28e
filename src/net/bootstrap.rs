//! REST bootstrap handlers: room creation and the initial fetch a client
//! makes before opening its persistent session (spec §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use crate::wire::{BootstrapResponse, CreateRoomResponse, Settings as WireSettings};

use super::AppState;

const INTRO_JS: &str = "// Start typing — everyone connected to this room sees your changes live.\n";

pub async fn create_room(State(state): State<Arc<AppState>>) -> Json<CreateRoomResponse> {
    let room_id = state.registry.create().await;
    Json(CreateRoomResponse { room_id })
}

pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<BootstrapResponse>, StatusCode> {
    let handle = state
        .registry
        .get(&room_id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    let events = handle.bootstrap().await;
    Ok(Json(BootstrapResponse {
        events,
        settings: WireSettings {
            heartbit_interval: state.settings.heartbit_interval_secs,
            document_limit: state.settings.document_limit,
        },
    }))
}

pub async fn intro_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], INTRO_JS)
}
