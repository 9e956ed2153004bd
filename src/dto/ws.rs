use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{config::Limits, dto::validation::validate_create_limits, state::room::RoomCode};

/// Why an inbound frame was dropped before reaching the coordinator.
#[derive(Debug, Error)]
pub enum InboundError {
    /// Not JSON, missing `type`, or fields not matching the announced type.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Well-formed message with out-of-range values.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from participant WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParticipantInboundMessage {
    /// Set the display name of the connection.
    Name { name: String },
    /// Create a room with the sender as its only participant.
    Create(CreateRoomMessage),
    /// Join a room that has not started yet.
    Join { code: RoomCode },
    /// Start the sender's room.
    Start,
    /// Submit an answer for the active round.
    Guess { guess: String },
    /// Leave the current room.
    Leave,
    /// Any other `type`; dropped by the transport.
    #[serde(other)]
    Unknown,
}

impl ParticipantInboundMessage {
    /// Parse a text frame and validate it against the configured limits.
    pub fn from_json_str(text: &str, limits: &Limits) -> Result<Self, InboundError> {
        let message = serde_json::from_str::<Self>(text)?;
        if let Self::Create(create) = &message {
            create.validate()?;
            validate_create_limits(create, limits)?;
        }
        Ok(message)
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
/// Parameters of a `create` message.
pub struct CreateRoomMessage {
    /// Number of rounds (songs) in the room.
    #[validate(range(min = 1))]
    pub num_of_rounds: u32,
    /// Duration of each round, in seconds.
    #[validate(range(min = 1))]
    pub round_duration: u64,
    /// Optional artist used to search the catalog.
    #[serde(default)]
    #[validate(length(max = 100))]
    pub artist: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
/// Song of the active round; every field is empty when no round is active.
pub struct SongSnapshot {
    #[serde(rename = "trackName")]
    pub name: String,
    #[serde(rename = "previewUrl")]
    pub preview_url: String,
    #[serde(rename = "artworkUrl100")]
    pub artwork_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Participant entry of a room snapshot.
pub struct ParticipantSnapshot {
    pub name: String,
    /// Sorted indices of the rounds answered correctly.
    pub rounds_correct: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Full room state pushed to every participant after each change.
pub struct RoomSnapshot {
    pub code: RoomCode,
    /// `-1` before start, the active round index, or `numRounds` once finished.
    pub round: i64,
    pub num_rounds: usize,
    pub participants: Vec<ParticipantSnapshot>,
    pub song: SongSnapshot,
    /// RFC 3339 deadline of the active round, the zero timestamp otherwise.
    pub exp: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Sent only to the originating participant when its action is refused.
pub struct RejectionNotice {
    pub error: RejectionDetail,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Machine-readable reason plus a human-readable message.
pub struct RejectionDetail {
    pub kind: String,
    pub message: String,
}

impl RejectionNotice {
    /// Build a notice from a reason kind and its message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: RejectionDetail {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ParticipantInboundMessage, InboundError> {
        ParticipantInboundMessage::from_json_str(text, &Limits::default())
    }

    #[test]
    fn parses_every_action_type() {
        assert!(matches!(
            parse(r#"{"type":"name","name":"Ada"}"#),
            Ok(ParticipantInboundMessage::Name { name }) if name == "Ada"
        ));
        assert!(matches!(
            parse(r#"{"type":"create","numOfRounds":3,"roundDuration":30,"artist":"Queen"}"#),
            Ok(ParticipantInboundMessage::Create(CreateRoomMessage {
                num_of_rounds: 3,
                round_duration: 30,
                artist: Some(_),
            }))
        ));
        assert!(matches!(
            parse(r#"{"type":"join","code":4}"#),
            Ok(ParticipantInboundMessage::Join { code: 4 })
        ));
        assert!(matches!(
            parse(r#"{"type":"start"}"#),
            Ok(ParticipantInboundMessage::Start)
        ));
        assert!(matches!(
            parse(r#"{"type":"guess","guess":"Under Pressure"}"#),
            Ok(ParticipantInboundMessage::Guess { guess }) if guess == "Under Pressure"
        ));
        assert!(matches!(
            parse(r#"{"type":"leave"}"#),
            Ok(ParticipantInboundMessage::Leave)
        ));
    }

    #[test]
    fn unknown_type_is_recognized_as_unknown() {
        assert!(matches!(
            parse(r#"{"type":"dance"}"#),
            Ok(ParticipantInboundMessage::Unknown)
        ));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(parse("not json"), Err(InboundError::Malformed(_))));
        assert!(matches!(
            parse(r#"{"code":4}"#),
            Err(InboundError::Malformed(_))
        ));
        assert!(matches!(
            parse(r#"{"type":"join","code":"four"}"#),
            Err(InboundError::Malformed(_))
        ));
        assert!(matches!(
            parse(r#"{"type":"guess"}"#),
            Err(InboundError::Malformed(_))
        ));
    }

    #[test]
    fn create_outside_limits_is_invalid() {
        assert!(matches!(
            parse(r#"{"type":"create","numOfRounds":0,"roundDuration":30}"#),
            Err(InboundError::Invalid(_))
        ));
        assert!(matches!(
            parse(r#"{"type":"create","numOfRounds":3,"roundDuration":100000}"#),
            Err(InboundError::Invalid(_))
        ));
    }

    #[test]
    fn snapshot_uses_client_field_names() {
        let snapshot = RoomSnapshot {
            code: 2,
            round: -1,
            num_rounds: 3,
            participants: vec![ParticipantSnapshot {
                name: "Ada".into(),
                rounds_correct: vec![],
            }],
            song: SongSnapshot::default(),
            exp: crate::dto::ZERO_TIMESTAMP.into(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "code": 2,
                "round": -1,
                "numRounds": 3,
                "participants": [{ "name": "Ada", "roundsCorrect": [] }],
                "song": { "trackName": "", "previewUrl": "", "artworkUrl100": "" },
                "exp": "0001-01-01T00:00:00Z"
            })
        );
    }
}
