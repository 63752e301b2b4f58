use super::types::{GameEvent, OrphanedBalance, RoomUpdate};
use crate::domain::{KillEvent, Room, RoomError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Drives every room from one fixed-rate clock.
///
/// Each frame number is broadcast to all room tasks; a room that falls behind skips the
/// missed frames instead of replaying them.
pub async fn tick_scheduler(tick_tx: broadcast::Sender<u64>, tick_interval: Duration) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frame: u64 = 0;

    loop {
        interval.tick().await;
        frame += 1;
        // No receivers just means no rooms exist yet.
        let _ = tick_tx.send(frame);
    }
}

/// Owns one room for its whole lifetime.
///
/// Events queued between ticks are drained at the start of each tick, so every tick
/// runs against a fixed set of inputs and the room is never touched concurrently.
pub async fn room_task(
    mut room: Room,
    mut event_rx: mpsc::Receiver<GameEvent>,
    mut tick_rx: broadcast::Receiver<u64>,
    update_tx: broadcast::Sender<RoomUpdate>,
    kill_tx: broadcast::Sender<KillEvent>,
    orphan_tx: broadcast::Sender<OrphanedBalance>,
    shutdown: Arc<Notify>,
) {
    info!(room_id = %room.room_id(), "room task started");

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                break;
            }
            frame = tick_rx.recv() => {
                match frame {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(room_id = %room.room_id(), missed, "room fell behind the scheduler; skipping ticks");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(room_id = %room.room_id(), "tick scheduler stopped; room task exiting");
                        break;
                    }
                }
            }
        }

        drain_events(&mut room, &mut event_rx, &orphan_tx);

        let outcome = room.tick();
        for event in &outcome.kill_events {
            let _ = kill_tx.send(*event);
        }
        let _ = update_tx.send(RoomUpdate {
            tick: outcome.snapshot.tick,
            snapshot: Arc::new(outcome.snapshot),
            kill_events: outcome.kill_events,
        });
    }

    info!(room_id = %room.room_id(), players = room.player_count(), "room task stopped");
}

fn drain_events(
    room: &mut Room,
    event_rx: &mut mpsc::Receiver<GameEvent>,
    orphan_tx: &broadcast::Sender<OrphanedBalance>,
) {
    while let Ok(event) = event_rx.try_recv() {
        match event {
            GameEvent::Join {
                player_id,
                display_name,
                entry_balance,
                session_id,
                reply,
            } => {
                let result = room.add_player(player_id, &display_name, entry_balance);
                if let Err(e) = &result {
                    warn!(room_id = %room.room_id(), player_id, error = ?e, "join rejected");
                }
                if let Err(Ok(_)) = reply.send(result) {
                    // The caller gave up waiting; do not leave an orphan snake behind.
                    if let Ok(balance) = room.remove_player(player_id) {
                        hand_back_orphan(room, orphan_tx, player_id, session_id, balance);
                    }
                }
            }
            GameEvent::Leave { player_id, reply } => {
                let result = room.remove_player(player_id);
                if result == Err(RoomError::UnknownPlayer) {
                    debug!(room_id = %room.room_id(), player_id, "leave for unknown player");
                }
                let _ = reply.send(result);
            }
            GameEvent::Input { player_id, input } => {
                if let Err(e) = room.apply_input(player_id, input) {
                    // Inputs racing a death or leave are expected.
                    debug!(room_id = %room.room_id(), player_id, error = ?e, "input dropped");
                }
            }
        }
    }
}

// The entry fee is already charged, so the balance must reach someone who can settle it.
fn hand_back_orphan(
    room: &Room,
    orphan_tx: &broadcast::Sender<OrphanedBalance>,
    player_id: u64,
    session_id: String,
    balance: u64,
) {
    let orphan = OrphanedBalance {
        player_id,
        session_id,
        balance,
    };
    match orphan_tx.send(orphan) {
        Ok(_) => {
            warn!(room_id = %room.room_id(), player_id, balance, "join reply dropped; balance handed back");
        }
        Err(broadcast::error::SendError(orphan)) => {
            error!(
                critical = true,
                room_id = %room.room_id(),
                player_id,
                session_id = %orphan.session_id,
                balance,
                "join reply dropped and nobody is settling orphaned balances"
            );
        }
    }
}
