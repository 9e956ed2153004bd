//! Room snapshot construction and best-effort fan-out to participant queues.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::{
    dto::{
        ZERO_TIMESTAMP, format_timestamp,
        ws::{ParticipantSnapshot, RejectionNotice, RoomSnapshot, SongSnapshot},
    },
    state::room::{OutboundFrame, ParticipantHandle, Room},
};

/// Project a room into the payload every participant receives. Never mutates the room.
pub fn build_snapshot(room: &Room) -> RoomSnapshot {
    let participants = room
        .participants()
        .map(|participant| ParticipantSnapshot {
            name: participant.name(),
            rounds_correct: room.rounds_correct(participant.id()),
        })
        .collect();

    let (song, exp) = match room.active_round() {
        Some((_, round)) => (
            SongSnapshot {
                name: round.song().name.clone(),
                preview_url: round.song().preview_url.clone(),
                artwork_url: round.song().artwork_url.clone(),
            },
            round
                .deadline()
                .map(format_timestamp)
                .unwrap_or_else(|| ZERO_TIMESTAMP.into()),
        ),
        None => (SongSnapshot::default(), ZERO_TIMESTAMP.into()),
    };

    RoomSnapshot {
        code: room.code(),
        round: room.round_index(),
        num_rounds: room.rounds().len(),
        participants,
        song,
        exp,
    }
}

/// Serialize the room snapshot once and queue it for every participant.
pub fn broadcast_room(room: &Room) {
    let Some(frame) = encode(&build_snapshot(room)) else {
        return;
    };
    for participant in room.participants() {
        deliver(participant, frame.clone());
    }
}

/// Tell a single participant why its action was refused.
pub fn notify_rejection(participant: &ParticipantHandle, kind: &str, message: &str) {
    if let Some(frame) = encode(&RejectionNotice::new(kind, message)) {
        deliver(participant, frame);
    }
}

/// Serialization failure is a bug, not a delivery problem: log and skip the frame.
fn encode<T>(value: &T) -> Option<OutboundFrame>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    match serde_json::to_string(value) {
        Ok(payload) => Some(Arc::from(payload)),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            None
        }
    }
}

/// Fire-and-forget push; a stalled connection loses frames instead of blocking the caller.
fn deliver(participant: &ParticipantHandle, frame: OutboundFrame) {
    match participant.try_deliver(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(participant = %participant.id(), "outbound queue full; frame dropped");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(participant = %participant.id(), "connection closed; frame dropped");
        }
    }
}
