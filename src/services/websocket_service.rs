use std::{fmt, time::Duration};

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures::{SinkExt, Stream, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, interval_at, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{InboundError, ParticipantInboundMessage},
    services::broadcast,
    state::{
        CoordinatorEvent, SharedState,
        room::{OutboundFrame, ParticipantHandle, ParticipantId},
    },
};

/// Silence tolerated on the inbound side before the connection is considered dead.
const PONG_WAIT: Duration = Duration::from_secs(60);
/// Pings are sent slightly more often than [`PONG_WAIT`].
const PING_PERIOD: Duration = Duration::from_secs(54);
/// Time given to the writer to flush once the reader is done.
const WRITER_SHUTDOWN: Duration = Duration::from_secs(5);

/// Handle the full lifecycle of one participant WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (sender, receiver) = socket.split();
    let (outbound_tx, outbound_rx) =
        mpsc::channel::<OutboundFrame>(state.config().limits.outbound_capacity);
    let (name_tx, name_rx) = watch::channel(String::new());
    let participant = ParticipantHandle::new(ParticipantId::new(), name_rx, outbound_tx);

    // Dedicated writer task keeps snapshots and pings flowing even while we await inbound frames.
    let writer_task = tokio::spawn(write_frames(sender, outbound_rx));

    read_frames(&state, participant, name_tx, receiver).await;

    finalize(writer_task).await;
}

/// Feed inbound frames to the coordinator until the peer goes away, then release its membership.
///
/// The connection ends on a close frame, a transport error, the end of the stream, or when
/// nothing arrives within [`PONG_WAIT`].
async fn read_frames<R, E>(
    state: &SharedState,
    participant: ParticipantHandle,
    name_tx: watch::Sender<String>,
    mut receiver: R,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let id = participant.id();
    info!(participant = %id, "participant connected");

    loop {
        let message = match timeout(PONG_WAIT, receiver.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(err))) => {
                warn!(participant = %id, error = %err, "websocket error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(participant = %id, "no traffic within pong wait; dropping connection");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                debug!(participant = %id, payload = %text, "received participant message");
                handle_text(state, &participant, &name_tx, text.as_str());
            }
            Message::Close(_) => {
                info!(participant = %id, "participant closed");
                break;
            }
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    if let Err(err) = state
        .coordinator()
        .submit(CoordinatorEvent::Leave { participant })
    {
        warn!(participant = %id, error = %err, "could not release membership");
    }
    info!(participant = %id, "participant disconnected");
}

/// Decode one text frame and route it: names stay local, actions go to the coordinator.
fn handle_text(
    state: &SharedState,
    participant: &ParticipantHandle,
    name_tx: &watch::Sender<String>,
    text: &str,
) {
    let message = match ParticipantInboundMessage::from_json_str(text, &state.config().limits) {
        Ok(message) => message,
        Err(err) => {
            warn!(participant = %participant.id(), error = %err, "failed to parse or validate participant message");
            if state.config().notify_rejections {
                let kind = match err {
                    InboundError::Malformed(_) => "malformed_message",
                    InboundError::Invalid(_) => "invalid_message",
                };
                broadcast::notify_rejection(participant, kind, &err.to_string());
            }
            return;
        }
    };

    let event = match message {
        ParticipantInboundMessage::Name { name } => {
            name_tx.send_replace(name.trim().to_string());
            return;
        }
        ParticipantInboundMessage::Create(create) => CoordinatorEvent::CreateRoom {
            participant: participant.clone(),
            num_rounds: create.num_of_rounds as usize,
            round_duration: Duration::from_secs(create.round_duration),
            artist: create.artist,
        },
        ParticipantInboundMessage::Join { code } => CoordinatorEvent::Join {
            participant: participant.clone(),
            code,
        },
        ParticipantInboundMessage::Start => CoordinatorEvent::Start {
            participant: participant.clone(),
        },
        ParticipantInboundMessage::Guess { guess } => CoordinatorEvent::Guess {
            participant: participant.clone(),
            text: guess,
        },
        ParticipantInboundMessage::Leave => CoordinatorEvent::Leave {
            participant: participant.clone(),
        },
        ParticipantInboundMessage::Unknown => {
            warn!(participant = %participant.id(), "ignoring message of unknown type");
            return;
        }
    };

    if let Err(err) = state.coordinator().submit(event) {
        warn!(participant = %participant.id(), error = %err, "dropping participant action");
    }
}

/// Drain the outbound queue into the socket and keep the peer alive with pings.
async fn write_frames<S>(mut sender: S, mut outbound_rx: mpsc::Receiver<OutboundFrame>)
where
    S: futures::Sink<Message> + Unpin,
{
    let mut ping = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Give the writer a chance to flush, then stop it.
async fn finalize(mut writer_task: JoinHandle<()>) {
    if timeout(WRITER_SHUTDOWN, &mut writer_task).await.is_err() {
        writer_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::channel::mpsc as futures_mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::catalog::StaticSongCatalog,
        state::{
            AppState,
            room::RoomCode,
            testing::{FrameReceiver, drain, participant, songs},
        },
    };

    type Inbound = Result<Message, axum::Error>;

    fn state(notify_rejections: bool) -> SharedState {
        let config = AppConfig {
            notify_rejections,
            ..AppConfig::default()
        };
        AppState::new(config, Arc::new(StaticSongCatalog::new(songs(5), false)))
    }

    #[tokio::test]
    async fn name_is_kept_on_the_connection() {
        let state = state(false);
        let (name_tx, name_rx) = watch::channel(String::new());
        let (tx, _rx) = mpsc::channel(4);
        let handle = ParticipantHandle::new(ParticipantId::new(), name_rx, tx);

        handle_text(&state, &handle, &name_tx, r#"{"type":"name","name":"  Ada "}"#);
        assert_eq!(handle.name(), "Ada");
    }

    #[tokio::test]
    async fn create_message_reaches_coordinator() {
        let state = state(false);
        let (name_tx, _) = watch::channel(String::new());
        let (ada, mut rx) = participant("Ada");

        handle_text(
            &state,
            &ada,
            &name_tx,
            r#"{"type":"create","numOfRounds":2,"roundDuration":30}"#,
        );
        let frame = rx.recv().await.expect("room snapshot");
        let snapshot: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(snapshot["numRounds"], 2);
        assert_eq!(snapshot["round"], -1);
    }

    #[tokio::test]
    async fn malformed_message_is_dropped_with_optional_notice() {
        let (name_tx, _) = watch::channel(String::new());

        let silent = state(false);
        let (ada, mut ada_rx) = participant("Ada");
        handle_text(&silent, &ada, &name_tx, r#"{"numOfRounds":2}"#);
        handle_text(&silent, &ada, &name_tx, r#"{"type":"teleport"}"#);
        assert!(drain(&mut ada_rx).is_empty());

        let chatty = state(true);
        let (bob, mut bob_rx) = participant("Bob");
        handle_text(&chatty, &bob, &name_tx, "{");
        handle_text(
            &chatty,
            &bob,
            &name_tx,
            r#"{"type":"create","numOfRounds":0,"roundDuration":30}"#,
        );
        let kinds: Vec<_> = drain(&mut bob_rx)
            .into_iter()
            .map(|frame| frame["error"]["kind"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(kinds, ["malformed_message", "invalid_message"]);
    }

    /// Waiting room administered by Ada; returns its code and Ada's queue.
    async fn room_with_admin(state: &SharedState) -> (RoomCode, FrameReceiver) {
        let (ada, mut ada_rx) = participant("Ada");
        state
            .coordinator()
            .submit(CoordinatorEvent::CreateRoom {
                participant: ada,
                num_rounds: 2,
                round_duration: Duration::from_secs(30),
                artist: None,
            })
            .unwrap();
        let frame = ada_rx.recv().await.expect("room created");
        let code = serde_json::from_str::<serde_json::Value>(&frame).unwrap()["code"]
            .as_u64()
            .unwrap();
        (code, ada_rx)
    }

    fn connection() -> (ParticipantHandle, watch::Sender<String>) {
        let (name_tx, name_rx) = watch::channel(String::new());
        let (tx, _rx) = mpsc::channel(16);
        (ParticipantHandle::new(ParticipantId::new(), name_rx, tx), name_tx)
    }

    fn text(payload: String) -> Inbound {
        Ok(Message::Text(payload.into()))
    }

    fn join(code: RoomCode) -> Inbound {
        text(format!(r#"{{"type":"join","code":{code}}}"#))
    }

    /// Participant counts seen by Ada once every queued event has been applied.
    async fn membership_history(
        state: &SharedState,
        code: RoomCode,
        ada_rx: &mut FrameReceiver,
    ) -> Vec<usize> {
        state.coordinator().room_snapshot(code).await.unwrap();
        drain(ada_rx)
            .into_iter()
            .map(|frame| frame["participants"].as_array().unwrap().len())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_stream_releases_membership() {
        let state = state(false);
        let (code, mut ada_rx) = room_with_admin(&state).await;
        let (bob, name_tx) = connection();
        let (tx, inbound) = futures_mpsc::unbounded::<Inbound>();

        tx.unbounded_send(join(code)).unwrap();
        drop(tx);
        read_frames(&state, bob, name_tx, inbound).await;

        assert_eq!(membership_history(&state, code, &mut ada_rx).await, [2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_frame_releases_membership() {
        let state = state(false);
        let (code, mut ada_rx) = room_with_admin(&state).await;
        let (bob, name_tx) = connection();
        let bob_view = bob.clone();
        let (tx, inbound) = futures_mpsc::unbounded::<Inbound>();

        tx.unbounded_send(text(r#"{"type":"name","name":"Bob"}"#.to_string()))
            .unwrap();
        tx.unbounded_send(join(code)).unwrap();
        tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        read_frames(&state, bob, name_tx, inbound).await;

        assert_eq!(bob_view.name(), "Bob");
        assert_eq!(membership_history(&state, code, &mut ada_rx).await, [2, 1]);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_releases_membership() {
        let state = state(false);
        let (code, mut ada_rx) = room_with_admin(&state).await;
        let (bob, name_tx) = connection();
        let (tx, inbound) = futures_mpsc::unbounded::<Inbound>();

        tx.unbounded_send(join(code)).unwrap();
        tx.unbounded_send(Err(axum::Error::new(std::io::Error::other(
            "connection reset",
        ))))
        .unwrap();
        read_frames(&state, bob, name_tx, inbound).await;

        assert_eq!(membership_history(&state, code, &mut ada_rx).await, [2, 1]);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_is_dropped_after_pong_wait() {
        let state = state(false);
        let (code, mut ada_rx) = room_with_admin(&state).await;
        let (bob, name_tx) = connection();
        let (tx, inbound) = futures_mpsc::unbounded::<Inbound>();

        tx.unbounded_send(join(code)).unwrap();
        let started = Instant::now();
        read_frames(&state, bob, name_tx, inbound).await;

        let waited = started.elapsed();
        assert!(waited >= PONG_WAIT, "dropped after {waited:?}");
        assert!(waited < PONG_WAIT + Duration::from_secs(1));
        assert_eq!(membership_history(&state, code, &mut ada_rx).await, [2, 1]);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_forwards_frames_pings_and_closes() {
        let (sink_tx, mut sink_rx) = futures_mpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel::<OutboundFrame>(4);
        let writer = tokio::spawn(write_frames(sink_tx, rx));

        tx.send(Arc::from("{\"round\":0}")).await.unwrap();
        match sink_rx.next().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "{\"round\":0}"),
            other => panic!("expected text frame, got {other:?}"),
        }

        tokio::time::sleep(PING_PERIOD).await;
        assert!(matches!(sink_rx.next().await, Some(Message::Ping(_))));

        drop(tx);
        writer.await.unwrap();
        assert!(matches!(sink_rx.next().await, Some(Message::Close(None))));
    }
}
