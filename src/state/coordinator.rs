//! Single-writer session coordinator owning every room, round and membership.
//!
//! Participant actions, catalog results and round expiries all arrive on one mailbox and
//! are applied one at a time, so no handler ever observes another mid-flight.

use std::{collections::HashMap, sync::Arc, time::Duration};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    sync::{
        mpsc::{self, WeakUnboundedSender},
        oneshot,
    },
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    dao::catalog::{CatalogError, CatalogRequest, SongCatalog},
    dto::{room::RoomSummary, ws::RoomSnapshot},
    error::ServiceError,
    services::broadcast,
    state::{
        room::{ParticipantHandle, ParticipantId, Room, RoomCode, RoundCursor, Song},
        timer::spawn_round_timer,
    },
};

/// Upper bound on how long a read-only query waits for the coordinator.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the coordinator reacts to, in arrival order.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Create a room with `participant` as its admin.
    CreateRoom {
        participant: ParticipantHandle,
        num_rounds: usize,
        round_duration: Duration,
        artist: Option<String>,
    },
    /// Join an existing room that has not started.
    Join {
        participant: ParticipantHandle,
        code: RoomCode,
    },
    /// Start the participant's room.
    Start { participant: ParticipantHandle },
    /// Answer the active round of the participant's room.
    Guess {
        participant: ParticipantHandle,
        text: String,
    },
    /// Leave the current room, if any.
    Leave { participant: ParticipantHandle },
    /// The timer of round `round` in room `code` elapsed.
    RoundExpired { code: RoomCode, round: usize },
    /// Songs for a reserved room arrived (or failed to).
    CatalogFetched {
        participant: ParticipantId,
        code: RoomCode,
        result: Result<Vec<Song>, CatalogError>,
    },
    /// Summaries of every room.
    ListRooms {
        reply: oneshot::Sender<Vec<RoomSummary>>,
    },
    /// Current snapshot of one room.
    Snapshot {
        code: RoomCode,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
}

/// Why an action was refused. Terminal to the event only, never to the coordinator.
#[derive(Debug, Error)]
pub enum Rejection {
    /// Participant already belongs to a room.
    #[error("participant already belongs to room {0}")]
    AlreadyInRoom(RoomCode),
    /// Participant is waiting for a room of its own to be created.
    #[error("participant already has a room being created")]
    CreationPending,
    /// Defensive: the next room code is somehow taken.
    #[error("room code {0} is already in use")]
    CodeInUse(RoomCode),
    /// No room with this code.
    #[error("room {0} does not exist")]
    UnknownRoom(RoomCode),
    /// Room is past its waiting stage.
    #[error("room {0} has already started")]
    AlreadyStarted(RoomCode),
    /// Room has not started yet.
    #[error("room {0} has not started yet")]
    NotStarted(RoomCode),
    /// Every round of the room has been played.
    #[error("room {0} has already finished")]
    Finished(RoomCode),
    /// Participant holds no membership.
    #[error("participant is not in a room")]
    NotInRoom,
    /// Songs for the room could not be obtained.
    #[error("room creation failed: {0}")]
    Catalog(#[source] CatalogError),
}

impl Rejection {
    /// Stable snake_case identifier used in rejection notices.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyInRoom(_) => "already_in_room",
            Self::CreationPending => "creation_pending",
            Self::CodeInUse(_) => "code_in_use",
            Self::UnknownRoom(_) => "unknown_room",
            Self::AlreadyStarted(_) => "already_started",
            Self::NotStarted(_) => "not_started",
            Self::Finished(_) => "finished",
            Self::NotInRoom => "not_in_room",
            Self::Catalog(_) => "catalog_unavailable",
        }
    }
}

/// Room reserved for a participant while its songs are being fetched.
#[derive(Debug)]
struct PendingRoom {
    code: RoomCode,
    participant: ParticipantHandle,
    num_rounds: usize,
    round_duration: Duration,
}

/// Authoritative owner of the room table and the membership index.
pub struct Coordinator {
    catalog: Arc<dyn SongCatalog>,
    rooms: HashMap<RoomCode, Room>,
    memberships: HashMap<ParticipantId, RoomCode>,
    pending: HashMap<ParticipantId, PendingRoom>,
    next_code: RoomCode,
    events: WeakUnboundedSender<CoordinatorEvent>,
    notify_rejections: bool,
}

impl Coordinator {
    /// Build an empty coordinator; `events` is where timers and catalog tasks report back.
    pub fn new(
        catalog: Arc<dyn SongCatalog>,
        events: WeakUnboundedSender<CoordinatorEvent>,
        notify_rejections: bool,
    ) -> Self {
        Self {
            catalog,
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            pending: HashMap::new(),
            next_code: 0,
            events,
            notify_rejections,
        }
    }

    /// Consume events until every [`CoordinatorHandle`] is dropped.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<CoordinatorEvent>) {
        info!("session coordinator started");
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        for room in self.rooms.values_mut() {
            room.cancel_active_timer();
        }
        info!(rooms = self.rooms.len(), "session coordinator stopped");
    }

    /// Apply a single event.
    pub fn handle(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::CreateRoom {
                participant,
                num_rounds,
                round_duration,
                artist,
            } => {
                let outcome =
                    self.create_room(participant.clone(), num_rounds, round_duration, artist);
                self.report(&participant, outcome);
            }
            CoordinatorEvent::Join { participant, code } => {
                let outcome = self.join(participant.clone(), code);
                self.report(&participant, outcome);
            }
            CoordinatorEvent::Start { participant } => {
                let outcome = self.start(participant.id());
                self.report(&participant, outcome);
            }
            CoordinatorEvent::Guess { participant, text } => {
                let outcome = self.guess(participant.id(), &text);
                self.report(&participant, outcome);
            }
            CoordinatorEvent::Leave { participant } => self.leave(participant.id()),
            CoordinatorEvent::RoundExpired { code, round } => self.round_expired(code, round),
            CoordinatorEvent::CatalogFetched {
                participant,
                code,
                result,
            } => self.catalog_fetched(participant, code, result),
            CoordinatorEvent::ListRooms { reply } => {
                let mut rooms: Vec<RoomSummary> =
                    self.rooms.values().map(RoomSummary::from).collect();
                rooms.sort_by_key(|room| room.code);
                let _ = reply.send(rooms);
            }
            CoordinatorEvent::Snapshot { code, reply } => {
                let _ = reply.send(self.rooms.get(&code).map(broadcast::build_snapshot));
            }
        }
    }

    fn report(&self, participant: &ParticipantHandle, outcome: Result<(), Rejection>) {
        let Err(rejection) = outcome else {
            return;
        };
        info!(
            participant = %participant.id(),
            reason = %rejection,
            "action rejected"
        );
        if self.notify_rejections {
            broadcast::notify_rejection(participant, rejection.kind(), &rejection.to_string());
        }
    }

    /// Fail when `participant` already holds (or is about to hold) a membership.
    fn ensure_unaffiliated(&self, participant: ParticipantId) -> Result<(), Rejection> {
        if let Some(code) = self.memberships.get(&participant) {
            return Err(Rejection::AlreadyInRoom(*code));
        }
        if self.pending.contains_key(&participant) {
            return Err(Rejection::CreationPending);
        }
        Ok(())
    }

    fn membership(&self, participant: ParticipantId) -> Result<RoomCode, Rejection> {
        self.memberships
            .get(&participant)
            .copied()
            .ok_or(Rejection::NotInRoom)
    }

    /// Reserve a room code and fetch its songs off the event loop.
    fn create_room(
        &mut self,
        participant: ParticipantHandle,
        num_rounds: usize,
        round_duration: Duration,
        artist: Option<String>,
    ) -> Result<(), Rejection> {
        let id = participant.id();
        self.ensure_unaffiliated(id)?;

        let code = self.next_code;
        if self.rooms.contains_key(&code) || self.pending.values().any(|room| room.code == code) {
            return Err(Rejection::CodeInUse(code));
        }
        self.next_code += 1;

        info!(participant = %id, room = code, num_rounds, "reserving room; fetching songs");
        self.pending.insert(
            id,
            PendingRoom {
                code,
                participant,
                num_rounds,
                round_duration,
            },
        );

        let fetch = self.catalog.fetch(CatalogRequest {
            count: num_rounds,
            artist,
        });
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(CoordinatorEvent::CatalogFetched {
                    participant: id,
                    code,
                    result,
                });
            }
        });
        Ok(())
    }

    fn catalog_fetched(
        &mut self,
        participant: ParticipantId,
        code: RoomCode,
        result: Result<Vec<Song>, CatalogError>,
    ) {
        let Some(pending) = self.pending.remove(&participant) else {
            debug!(participant = %participant, room = code, "creation abandoned before songs arrived");
            return;
        };
        if pending.code != code {
            warn!(participant = %participant, room = code, expected = pending.code, "songs for a stale reservation");
            self.pending.insert(participant, pending);
            return;
        }

        let PendingRoom {
            participant: handle,
            num_rounds,
            round_duration,
            ..
        } = pending;

        let mut songs = match result {
            Ok(songs) => songs,
            Err(err) => {
                warn!(participant = %participant, room = code, error = %err, "song catalog failed; room not created");
                self.report(&handle, Err(Rejection::Catalog(err)));
                return;
            }
        };
        if songs.len() < num_rounds {
            let err = CatalogError::InsufficientSongs {
                requested: num_rounds,
                available: songs.len(),
            };
            self.report(&handle, Err(Rejection::Catalog(err)));
            return;
        }
        songs.truncate(num_rounds);

        let room = Room::new(code, songs, round_duration, handle);
        broadcast::broadcast_room(&room);
        self.memberships.insert(participant, code);
        self.rooms.insert(code, room);
        info!(participant = %participant, room = code, "room created");
    }

    fn join(&mut self, participant: ParticipantHandle, code: RoomCode) -> Result<(), Rejection> {
        let id = participant.id();
        let room = self.rooms.get(&code).ok_or(Rejection::UnknownRoom(code))?;
        if room.cursor() != RoundCursor::NotStarted {
            return Err(Rejection::AlreadyStarted(code));
        }
        self.ensure_unaffiliated(id)?;

        let room = self
            .rooms
            .get_mut(&code)
            .ok_or(Rejection::UnknownRoom(code))?;
        room.add_participant(participant);
        self.memberships.insert(id, code);
        info!(participant = %id, room = code, "participant joined");
        broadcast::broadcast_room(room);
        Ok(())
    }

    fn start(&mut self, participant: ParticipantId) -> Result<(), Rejection> {
        let code = self.membership(participant)?;
        let room = self.rooms.get(&code).ok_or(Rejection::UnknownRoom(code))?;
        match room.cursor() {
            RoundCursor::NotStarted => {}
            RoundCursor::Active(_) => return Err(Rejection::AlreadyStarted(code)),
            RoundCursor::Finished => return Err(Rejection::Finished(code)),
        }

        info!(participant = %participant, room = code, "room started");
        self.advance(code);
        Ok(())
    }

    fn guess(&mut self, participant: ParticipantId, text: &str) -> Result<(), Rejection> {
        let code = self.membership(participant)?;
        let room = self
            .rooms
            .get_mut(&code)
            .ok_or(Rejection::UnknownRoom(code))?;
        let (index, round) = match room.cursor() {
            RoundCursor::NotStarted => return Err(Rejection::NotStarted(code)),
            RoundCursor::Finished => return Err(Rejection::Finished(code)),
            RoundCursor::Active(_) => room
                .active_round()
                .ok_or(Rejection::Finished(code))?,
        };

        if round.has_guessed(participant) {
            debug!(participant = %participant, room = code, round = index, "repeated correct guess ignored");
            return Ok(());
        }
        if !round.song().matches(text) {
            debug!(participant = %participant, room = code, round = index, "wrong guess");
            return Ok(());
        }

        room.credit_active(participant);
        if room.all_correct() {
            info!(room = code, round = index, "every participant guessed right; advancing");
            self.advance(code);
        } else {
            info!(participant = %participant, room = code, round = index, "correct guess; waiting for others");
            broadcast::broadcast_room(room);
        }
        Ok(())
    }

    fn leave(&mut self, participant: ParticipantId) {
        if let Some(pending) = self.pending.remove(&participant) {
            info!(participant = %participant, room = pending.code, "pending room creation abandoned");
        }

        let Some(code) = self.memberships.remove(&participant) else {
            debug!(participant = %participant, "participant was not in a room");
            return;
        };
        let Some(room) = self.rooms.get_mut(&code) else {
            warn!(participant = %participant, room = code, "membership pointed at a missing room");
            return;
        };

        room.remove_participant(participant);
        info!(participant = %participant, room = code, "participant left");

        if room.is_empty() {
            room.cancel_active_timer();
            self.rooms.remove(&code);
            info!(room = code, "room closed");
        } else if room.all_correct() {
            info!(room = code, "remaining participants all guessed right; advancing");
            self.advance(code);
        } else {
            broadcast::broadcast_room(room);
        }
    }

    fn round_expired(&mut self, code: RoomCode, round: usize) {
        let Some(room) = self.rooms.get(&code) else {
            debug!(room = code, round, "expiry for a closed room ignored");
            return;
        };
        if room.cursor() != RoundCursor::Active(round) {
            debug!(room = code, round, "stale round expiry ignored");
            return;
        }

        info!(room = code, round, "time's up");
        self.advance(code);
    }

    /// Move `code` to its next round, arm the new round's timer and broadcast.
    fn advance(&mut self, code: RoomCode) {
        let Some(room) = self.rooms.get_mut(&code) else {
            return;
        };

        match room.advance(OffsetDateTime::now_utc()) {
            Some(armed) => {
                spawn_round_timer(
                    code,
                    armed.index,
                    room.round_duration(),
                    armed.cancel,
                    self.events.clone(),
                );
            }
            None => info!(room = code, "room finished"),
        }
        broadcast::broadcast_room(room);
    }
}

/// Cloneable entry point into the coordinator mailbox.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Spawn the coordinator loop and return a handle to it.
    pub fn spawn(catalog: Arc<dyn SongCatalog>, notify_rejections: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(catalog, tx.downgrade(), notify_rejections);
        tokio::spawn(coordinator.run(rx));
        Self { tx }
    }

    /// Queue an event; fails only once the coordinator has stopped.
    pub fn submit(&self, event: CoordinatorEvent) -> Result<(), ServiceError> {
        self.tx
            .send(event)
            .map_err(|_| ServiceError::CoordinatorStopped)
    }

    /// Whether the coordinator loop is still consuming events.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Summaries of every room, ordered by code.
    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, ServiceError> {
        self.query(|reply| CoordinatorEvent::ListRooms { reply })
            .await
    }

    /// Snapshot of room `code`, if it exists.
    pub async fn room_snapshot(&self, code: RoomCode) -> Result<Option<RoomSnapshot>, ServiceError> {
        self.query(|reply| CoordinatorEvent::Snapshot { code, reply })
            .await
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> CoordinatorEvent,
    ) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.submit(build(reply))?;
        match timeout(DEFAULT_QUERY_TIMEOUT, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ServiceError::CoordinatorStopped),
            Err(_) => Err(ServiceError::Timeout),
        }
    }
}
