use serde::Serialize;
use utoipa::ToSchema;

use crate::state::room::{Room, RoomCode, RoundCursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Lifecycle stage of a room.
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Short description of a room for the lobby listing.
pub struct RoomSummary {
    pub code: RoomCode,
    pub round: i64,
    pub num_rounds: usize,
    pub participants: usize,
    pub status: RoomStatus,
}

#[derive(Debug, Serialize, ToSchema)]
/// Response of the `/rooms` listing.
pub struct RoomsResponse {
    pub rooms: Vec<RoomSummary>,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        let status = match room.cursor() {
            RoundCursor::NotStarted => RoomStatus::Waiting,
            RoundCursor::Active(_) => RoomStatus::Playing,
            RoundCursor::Finished => RoomStatus::Finished,
        };
        Self {
            code: room.code(),
            round: room.round_index(),
            num_rounds: room.rounds().len(),
            participants: room.participant_count(),
            status,
        }
    }
}
