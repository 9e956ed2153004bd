use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot, watch,
};
use uuid::Uuid;

use crate::dao::catalog::models::CatalogTrack;

/// Identifier handed out to rooms, strictly increasing for the coordinator lifetime.
pub type RoomCode = u64;

/// Serialized frame queued on a participant outbound channel.
pub type OutboundFrame = Arc<str>;

/// Opaque identity of a connected participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Allocate a fresh random identifier for a new connection.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity plus outbound delivery channel of one connected participant.
///
/// The transport owns the connection; the coordinator only keeps clones of this handle
/// for the rooms the participant belongs to.
#[derive(Debug, Clone)]
pub struct ParticipantHandle {
    id: ParticipantId,
    name: watch::Receiver<String>,
    outbound: mpsc::Sender<OutboundFrame>,
}

impl ParticipantHandle {
    /// Bundle an identifier, the connection's display name cell and its outbound queue.
    pub fn new(
        id: ParticipantId,
        name: watch::Receiver<String>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self { id, name, outbound }
    }

    /// Identifier used to index every coordinator structure.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Display name as currently set by the connection.
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    /// Queue a frame without waiting; a full or closed queue hands the frame back.
    pub fn try_deliver(&self, frame: OutboundFrame) -> Result<(), TrySendError<OutboundFrame>> {
        self.outbound.try_send(frame)
    }
}

/// Playable song attached to a round.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Title participants have to guess.
    pub name: String,
    /// URL of the audio clip played during the round.
    pub preview_url: String,
    /// URL of the cover artwork.
    #[serde(default)]
    pub artwork_url: String,
}

impl Song {
    /// Compare a guess against the title, ignoring case and surrounding whitespace.
    pub fn matches(&self, guess: &str) -> bool {
        guess.trim().to_lowercase() == self.name.trim().to_lowercase()
    }
}

impl TryFrom<CatalogTrack> for Song {
    type Error = CatalogTrack;

    /// Tracks without a title or a preview clip cannot be played.
    fn try_from(track: CatalogTrack) -> Result<Self, Self::Error> {
        let playable = track
            .track_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
            && track
                .preview_url
                .as_deref()
                .is_some_and(|url| !url.is_empty());
        if !playable {
            return Err(track);
        }

        Ok(Self {
            name: track.track_name.unwrap_or_default(),
            preview_url: track.preview_url.unwrap_or_default(),
            artwork_url: track.artwork_url.unwrap_or_default(),
        })
    }
}

/// One timed question of a room.
#[derive(Debug)]
pub struct Round {
    song: Song,
    correct_guessers: HashSet<ParticipantId>,
    deadline: Option<OffsetDateTime>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Round {
    fn new(song: Song) -> Self {
        Self {
            song,
            correct_guessers: HashSet::new(),
            deadline: None,
            cancel: None,
        }
    }

    /// Song played during this round.
    pub fn song(&self) -> &Song {
        &self.song
    }

    /// Absolute deadline, set once the round becomes active.
    pub fn deadline(&self) -> Option<OffsetDateTime> {
        self.deadline
    }

    /// Whether `participant` already answered this round correctly.
    pub fn has_guessed(&self, participant: ParticipantId) -> bool {
        self.correct_guessers.contains(&participant)
    }

    /// Participants credited with a correct answer.
    pub fn correct_guessers(&self) -> &HashSet<ParticipantId> {
        &self.correct_guessers
    }

    /// True while a timer is still waiting on this round's cancellation signal.
    pub fn timer_armed(&self) -> bool {
        self.cancel.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn activate(&mut self, deadline: OffsetDateTime) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.deadline = Some(deadline);
        self.cancel = Some(tx);
        rx
    }

    /// Fire the cancellation signal; a timer that already reported is unaffected.
    fn cancel_timer(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

/// Position of a room in its round sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundCursor {
    /// Waiting for the moderator to start.
    NotStarted,
    /// Round at this index is being played.
    Active(usize),
    /// Every round has been played.
    Finished,
}

/// Round that just became active and needs a timer.
#[derive(Debug)]
pub struct ArmedRound {
    /// Index of the round in the room.
    pub index: usize,
    /// Fired when the round ends before its deadline.
    pub cancel: oneshot::Receiver<()>,
}

/// One game session: a fixed sequence of rounds played by a set of participants.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    rounds: Vec<Round>,
    cursor: RoundCursor,
    participants: IndexMap<ParticipantId, ParticipantHandle>,
    round_duration: Duration,
}

impl Room {
    /// Build a room that has not started yet, with `admin` as its sole participant.
    pub fn new(
        code: RoomCode,
        songs: Vec<Song>,
        round_duration: Duration,
        admin: ParticipantHandle,
    ) -> Self {
        let mut participants = IndexMap::new();
        participants.insert(admin.id(), admin);
        Self {
            code,
            rounds: songs.into_iter().map(Round::new).collect(),
            cursor: RoundCursor::NotStarted,
            participants,
            round_duration,
        }
    }

    /// Code identifying the room.
    pub fn code(&self) -> RoomCode {
        self.code
    }

    /// Current cursor position.
    pub fn cursor(&self) -> RoundCursor {
        self.cursor
    }

    /// Cursor as exposed on the wire: `-1` before start, `len` once finished.
    pub fn round_index(&self) -> i64 {
        match self.cursor {
            RoundCursor::NotStarted => -1,
            RoundCursor::Active(index) => index as i64,
            RoundCursor::Finished => self.rounds.len() as i64,
        }
    }

    /// All rounds of the room, in play order.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Duration applied to every round deadline.
    pub fn round_duration(&self) -> Duration {
        self.round_duration
    }

    /// Participants currently joined, in join order.
    pub fn participants(&self) -> impl Iterator<Item = &ParticipantHandle> {
        self.participants.values()
    }

    /// Number of joined participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Whether `participant` is currently joined.
    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.participants.contains_key(&participant)
    }

    /// True once the last participant has left.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Index and data of the round being played, if any.
    pub fn active_round(&self) -> Option<(usize, &Round)> {
        match self.cursor {
            RoundCursor::Active(index) => self.rounds.get(index).map(|round| (index, round)),
            _ => None,
        }
    }

    /// Add a participant to the room.
    pub fn add_participant(&mut self, participant: ParticipantHandle) {
        self.participants.insert(participant.id(), participant);
    }

    /// Remove a participant along with any credit it earned, so every round's guessers
    /// stay a subset of the participants.
    pub fn remove_participant(&mut self, participant: ParticipantId) -> Option<ParticipantHandle> {
        let removed = self.participants.shift_remove(&participant)?;
        for round in &mut self.rounds {
            round.correct_guessers.remove(&participant);
        }
        Some(removed)
    }

    /// Credit `participant` for the active round. Returns false when nothing changed.
    pub fn credit_active(&mut self, participant: ParticipantId) -> bool {
        if !self.participants.contains_key(&participant) {
            return false;
        }
        match self.cursor {
            RoundCursor::Active(index) => self.rounds[index].correct_guessers.insert(participant),
            _ => false,
        }
    }

    /// Whether every participant answered the active round correctly.
    pub fn all_correct(&self) -> bool {
        let Some((_, round)) = self.active_round() else {
            return false;
        };
        !self.participants.is_empty()
            && self
                .participants
                .keys()
                .all(|id| round.correct_guessers.contains(id))
    }

    /// Sorted indices of the rounds `participant` answered correctly.
    pub fn rounds_correct(&self, participant: ParticipantId) -> Vec<usize> {
        self.rounds
            .iter()
            .enumerate()
            .filter(|(_, round)| round.correct_guessers.contains(&participant))
            .map(|(index, _)| index)
            .collect()
    }

    /// Move to the next round, cancelling the active one first.
    ///
    /// Returns the newly active round so the caller can start its timer, or `None` once
    /// the room is finished. Advancing a finished room is a no-op.
    pub fn advance(&mut self, now: OffsetDateTime) -> Option<ArmedRound> {
        let next = match self.cursor {
            RoundCursor::NotStarted => 0,
            RoundCursor::Active(index) => {
                self.rounds[index].cancel_timer();
                index + 1
            }
            RoundCursor::Finished => return None,
        };

        if next >= self.rounds.len() {
            self.cursor = RoundCursor::Finished;
            return None;
        }

        self.cursor = RoundCursor::Active(next);
        let cancel = self.rounds[next].activate(deadline_after(now, self.round_duration));
        Some(ArmedRound {
            index: next,
            cancel,
        })
    }

    /// Cancel the active round's timer, if one is running.
    pub fn cancel_active_timer(&mut self) {
        if let RoundCursor::Active(index) = self.cursor {
            self.rounds[index].cancel_timer();
        }
    }
}

/// `now + duration`, saturating at the latest representable instant.
fn deadline_after(now: OffsetDateTime, duration: Duration) -> OffsetDateTime {
    time::Duration::try_from(duration)
        .ok()
        .and_then(|duration| now.checked_add(duration))
        .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{participant, songs};

    fn room_with(count: usize) -> (Room, ParticipantId) {
        let (admin, _rx) = participant("admin");
        let id = admin.id();
        (
            Room::new(7, songs(count), Duration::from_secs(30), admin),
            id,
        )
    }

    #[test]
    fn guess_matching_ignores_case_and_surrounding_whitespace() {
        let song = Song {
            name: "Bohemian Rhapsody".into(),
            preview_url: "https://example.test/clip".into(),
            artwork_url: String::new(),
        };
        assert!(song.matches("Bohemian Rhapsody"));
        assert!(song.matches(" bohemian rhapsody "));
        assert!(song.matches("BOHEMIAN RHAPSODY"));
        assert!(!song.matches("Bohemian Rhapsod"));
        assert!(!song.matches(""));
    }

    #[test]
    fn new_room_waits_with_admin_only() {
        let (room, admin) = room_with(2);
        assert_eq!(room.cursor(), RoundCursor::NotStarted);
        assert_eq!(room.round_index(), -1);
        assert!(room.contains(admin));
        assert_eq!(room.participant_count(), 1);
        assert!(room.active_round().is_none());
        assert!(room.rounds().iter().all(|round| round.deadline().is_none()));
    }

    #[test]
    fn oversized_round_duration_saturates_deadline() {
        let (admin, _rx) = participant("admin");
        let mut room = Room::new(1, songs(1), Duration::from_secs(u64::MAX / 2), admin);

        let armed = room.advance(OffsetDateTime::now_utc()).expect("round 0");
        assert_eq!(armed.index, 0);
        assert_eq!(
            room.rounds()[0].deadline(),
            Some(PrimitiveDateTime::MAX.assume_utc())
        );
    }

    #[test]
    fn advance_walks_rounds_then_finishes() {
        let (mut room, _) = room_with(2);
        let now = OffsetDateTime::now_utc();

        let first = room.advance(now).expect("round 0");
        assert_eq!(first.index, 0);
        assert_eq!(room.round_index(), 0);
        assert_eq!(room.rounds()[0].deadline(), Some(now + Duration::from_secs(30)));
        assert!(room.rounds()[0].timer_armed());

        let mut cancel = first.cancel;
        let second = room.advance(now).expect("round 1");
        assert_eq!(second.index, 1);
        assert!(cancel.try_recv().is_ok(), "previous round must be cancelled");
        assert!(!room.rounds()[0].timer_armed());

        assert!(room.advance(now).is_none());
        assert_eq!(room.cursor(), RoundCursor::Finished);
        assert_eq!(room.round_index(), 2);
        assert!(room.advance(now).is_none());
        assert_eq!(room.round_index(), 2);
    }

    #[test]
    fn all_correct_tracks_every_participant() {
        let (mut room, admin) = room_with(1);
        let (guest, _rx) = participant("guest");
        let guest_id = guest.id();
        room.add_participant(guest);
        assert!(!room.all_correct());

        let _armed = room.advance(OffsetDateTime::now_utc());
        assert!(room.credit_active(guest_id));
        assert!(!room.credit_active(guest_id));
        assert!(!room.all_correct());
        assert!(room.credit_active(admin));
        assert!(room.all_correct());
        assert_eq!(room.rounds_correct(guest_id), vec![0]);
    }

    #[test]
    fn removing_participant_drops_its_credits() {
        let (mut room, admin) = room_with(2);
        let (guest, _rx) = participant("guest");
        let guest_id = guest.id();
        room.add_participant(guest);

        let _armed = room.advance(OffsetDateTime::now_utc());
        room.credit_active(guest_id);
        assert!(room.remove_participant(guest_id).is_some());
        assert!(room.rounds()[0].correct_guessers().is_empty());
        assert!(!room.all_correct());

        room.credit_active(admin);
        assert!(room.all_correct());
        assert!(room.remove_participant(guest_id).is_none());
    }

    #[test]
    fn credit_outside_active_round_is_ignored() {
        let (mut room, admin) = room_with(1);
        assert!(!room.credit_active(admin));
        let (stranger, _rx) = participant("stranger");
        let _armed = room.advance(OffsetDateTime::now_utc());
        assert!(!room.credit_active(stranger.id()));
    }

    #[test]
    fn catalog_track_without_preview_is_rejected() {
        let playable = CatalogTrack {
            track_name: Some("Song".into()),
            preview_url: Some("https://example.test/a".into()),
            artwork_url: None,
        };
        let silent = CatalogTrack {
            track_name: Some("Song".into()),
            preview_url: None,
            artwork_url: None,
        };
        assert_eq!(Song::try_from(playable).expect("playable").artwork_url, "");
        assert!(Song::try_from(silent).is_err());
    }
}
