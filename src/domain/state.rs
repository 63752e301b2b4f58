// Domain-level input, snapshot and event types.

use crate::domain::food::FoodKind;
use crate::domain::geometry::Point;

/// Movement command from a player; `None` fields keep the previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerInput {
    pub heading: Option<f32>,
    pub boosting: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnakeSnapshot {
    pub id: u64,
    pub display_name: String,
    pub color: &'static str,
    pub body: Vec<Point>,
    pub heading: f32,
    pub radius: f32,
    pub boosting: bool,
    pub balance: u64,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct FoodSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub kind: FoodKind,
}

/// Read-only broadcastable state of one room.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub tick: u64,
    pub world_size: f32,
    pub snakes: Vec<SnakeSnapshot>,
    pub food: Vec<FoodSnapshot>,
}

/// Record of one snake's death during a tick.
///
/// `killer_id` is `None` for wall deaths; the balance then stays with the house.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillEvent {
    pub victim_id: u64,
    pub killer_id: Option<u64>,
    pub transferred_amount: u64,
}

#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub snapshot: RoomSnapshot,
    pub kill_events: Vec<KillEvent>,
}
