//! Cancellable per-round timers reporting expiry back to the session coordinator.

use std::time::Duration;

use tokio::{
    sync::{mpsc::WeakUnboundedSender, oneshot},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info};

use crate::state::{coordinator::CoordinatorEvent, room::RoomCode};

/// Race the round duration against its cancellation signal.
///
/// On expiry a single [`CoordinatorEvent::RoundExpired`] is queued; on cancellation (or
/// when the round's sender is dropped with its room) nothing is reported. The timer never
/// touches room state itself.
pub fn spawn_round_timer(
    code: RoomCode,
    round: usize,
    duration: Duration,
    cancel: oneshot::Receiver<()>,
    events: WeakUnboundedSender<CoordinatorEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(room = code, round, ?duration, "round timer started");
        tokio::select! {
            biased;
            _ = cancel => {
                debug!(room = code, round, "round timer cancelled");
            }
            _ = sleep(duration) => {
                info!(room = code, round, "round timer elapsed");
                match events.upgrade() {
                    Some(tx) => {
                        let _ = tx.send(CoordinatorEvent::RoundExpired { code, round });
                    }
                    None => debug!(room = code, round, "coordinator gone; expiry dropped"),
                }
            }
        }
    })
}
