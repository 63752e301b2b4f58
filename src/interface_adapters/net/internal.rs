use crate::interface_adapters::http::error_response;
use crate::interface_adapters::net::client::spawn_room_serializer;
use crate::interface_adapters::state::AppState;
use crate::use_cases::RegistryError;

use axum::{
    extract::{Json, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;

const MAX_ROOM_ID_LEN: usize = 64;

#[derive(Debug, serde::Deserialize)]
pub struct RoomInitRequest {
    room_id: String,
}

#[derive(Debug, serde::Serialize)]
struct RoomInitResponse {
    room_id: String,
}

pub async fn create_room_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RoomInitRequest>,
) -> impl IntoResponse {
    let room_id = payload.room_id.trim().to_string();
    if room_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "room_id is required");
    }
    if room_id.len() > MAX_ROOM_ID_LEN {
        return error_response(StatusCode::BAD_REQUEST, "room_id is too long");
    }

    match state.room_registry.create_room(room_id.clone()).await {
        Ok(room) => {
            // Serializer first so sockets can subscribe immediately.
            spawn_room_serializer(&room);
            info!(room_id = %room_id, "room created via internal route");
            (StatusCode::CREATED, Json(RoomInitResponse { room_id })).into_response()
        }
        Err(RegistryError::AlreadyExists) => {
            error_response(StatusCode::CONFLICT, "room already exists")
        }
    }
}

/// Latest serialized update for a room, in the same envelope sockets receive.
pub async fn room_snapshot_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let Some(room) = state.room_registry.get_room(&room_id).await else {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    };

    let latest = room.update_latest_tx.borrow().clone();
    if latest.is_empty() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "room has not ticked yet");
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        latest.as_str().to_owned(),
    )
        .into_response()
}
