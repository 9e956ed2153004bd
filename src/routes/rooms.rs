use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::{room::RoomsResponse, ws::RoomSnapshot},
    error::AppError,
    services::room_service,
    state::{SharedState, room::RoomCode},
};

/// Read-only room endpoints for lobbies and spectators.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/{code}", get(get_room))
}

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Live rooms ordered by code", body = RoomsResponse))
)]
/// Return a summary of every live room.
pub async fn list_rooms(State(state): State<SharedState>) -> Result<Json<RoomsResponse>, AppError> {
    Ok(Json(room_service::list_rooms(&state).await?))
}

#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = u64, Path, description = "Code of the room to inspect")),
    responses(
        (status = 200, description = "Snapshot of the room", body = RoomSnapshot),
        (status = 404, description = "No room with this code")
    )
)]
/// Return the same snapshot the room's participants receive.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<RoomCode>,
) -> Result<Json<RoomSnapshot>, AppError> {
    Ok(Json(room_service::room_snapshot(&state, code).await?))
}
