use crate::{
    dto::{room::RoomsResponse, ws::RoomSnapshot},
    error::ServiceError,
    state::{SharedState, room::RoomCode},
};

/// List every live room, ordered by code.
pub async fn list_rooms(state: &SharedState) -> Result<RoomsResponse, ServiceError> {
    let rooms = state.coordinator().list_rooms().await?;
    Ok(RoomsResponse { rooms })
}

/// Return the snapshot participants of room `code` currently see.
pub async fn room_snapshot(
    state: &SharedState,
    code: RoomCode,
) -> Result<RoomSnapshot, ServiceError> {
    state
        .coordinator()
        .room_snapshot(code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::catalog::StaticSongCatalog,
        dto::room::RoomStatus,
        state::{
            AppState, CoordinatorEvent,
            testing::{participant, songs},
        },
    };

    fn state() -> SharedState {
        AppState::new(
            AppConfig::default(),
            Arc::new(StaticSongCatalog::new(songs(5), false)),
        )
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = state();
        assert!(list_rooms(&state).await.unwrap().rooms.is_empty());
        assert!(matches!(
            room_snapshot(&state, 42).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn created_room_is_listed_and_readable() {
        let state = state();
        let (ada, mut rx) = participant("Ada");
        state
            .coordinator()
            .submit(CoordinatorEvent::CreateRoom {
                participant: ada,
                num_rounds: 3,
                round_duration: Duration::from_secs(30),
                artist: None,
            })
            .unwrap();
        // The first snapshot marks the end of the catalog round trip.
        rx.recv().await.expect("room created");

        let listed = list_rooms(&state).await.unwrap().rooms;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].code, 0);
        assert_eq!(listed[0].status, RoomStatus::Waiting);
        assert_eq!(listed[0].participants, 1);

        let snapshot = room_snapshot(&state, 0).await.unwrap();
        assert_eq!(snapshot.num_rounds, 3);
        assert_eq!(snapshot.participants[0].name, "Ada");
    }
}
