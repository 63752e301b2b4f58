// Use-case level inputs/outputs for the room loop.

use crate::domain::{KillEvent, PlayerInput, RoomError, RoomSnapshot, SnakeSnapshot};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Membership and input events queued for the next tick of a room.
#[derive(Debug)]
pub enum GameEvent {
    Join {
        player_id: u64,
        display_name: String,
        entry_balance: u64,
        // Ledger session the entry fee was charged against.
        session_id: String,
        reply: oneshot::Sender<Result<SnakeSnapshot, RoomError>>,
    },
    Leave {
        player_id: u64,
        reply: oneshot::Sender<Result<u64, RoomError>>,
    },
    Input {
        player_id: u64,
        input: PlayerInput,
    },
}

/// Result of one room tick, shared with every subscriber.
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    pub tick: u64,
    pub snapshot: Arc<RoomSnapshot>,
    pub kill_events: Vec<KillEvent>,
}

/// Balance of a player whose join completed after the caller stopped waiting.
///
/// The snake is removed straight away; whoever listens owes the ledger a settlement.
#[derive(Debug, Clone)]
pub struct OrphanedBalance {
    pub player_id: u64,
    pub session_id: String,
    pub balance: u64,
}
