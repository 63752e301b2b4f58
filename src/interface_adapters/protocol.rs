// Wire protocol DTOs and conversions for public game server messages.
// Ledger DTOs live with the ledger client.

use crate::domain::{FoodKind, FoodSnapshot, KillEvent, PlayerInput, SnakeSnapshot};
use crate::use_cases::RoomUpdate;
use serde::{Deserialize, Serialize};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Assigned identity for the connection after Join is verified.
    Identity { player_id: String },
    // The player's snake as spawned into the room.
    Joined(SnakeDto),
    // Snapshot of the room for a given tick.
    WorldUpdate(WorldUpdateDto),
    // The player's snake died; the session ends after this.
    Died {
        killer_id: Option<String>,
        transferred_amount: u64,
    },
    // Final balance was settled with the ledger.
    BalanceSaved { final_balance: u64 },
    // Settlement could not be confirmed; the balance is held for reconciliation.
    BalanceNotSaved { final_balance: u64 },
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Initial handshake carrying the ledger session token.
    Join(JoinPayload),
    // Steering input sent after a successful Join.
    Input(PlayerInputDto),
    // Cash out and end the session.
    Leave,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinPayload {
    pub session_token: String,
}

/// Steering input; omitted fields keep their previous value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerInputDto {
    #[serde(default)]
    pub heading: Option<f32>,
    #[serde(default)]
    pub boosting: Option<bool>,
}

impl From<PlayerInputDto> for PlayerInput {
    fn from(input: PlayerInputDto) -> Self {
        Self {
            heading: input.heading,
            boosting: input.boosting,
        }
    }
}

/// Room state sent to clients on each tick.
#[derive(Debug, Clone, Serialize)]
pub struct WorldUpdateDto {
    pub room_id: String,
    pub tick: u64,
    pub world_size: f32,
    pub snakes: Vec<SnakeDto>,
    pub food: Vec<FoodDto>,
    pub kills: Vec<KillDto>,
}

impl From<&RoomUpdate> for WorldUpdateDto {
    fn from(update: &RoomUpdate) -> Self {
        let snapshot = &update.snapshot;
        Self {
            room_id: snapshot.room_id.clone(),
            tick: update.tick,
            world_size: snapshot.world_size,
            snakes: snapshot.snakes.iter().map(SnakeDto::from).collect(),
            food: snapshot.food.iter().map(FoodDto::from).collect(),
            kills: update.kill_events.iter().map(KillDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnakeDto {
    pub id: String,
    pub name: String,
    pub color: &'static str,
    // Head first, as [x, y] pairs to keep frames compact.
    pub body: Vec<[f32; 2]>,
    pub heading: f32,
    pub radius: f32,
    pub boosting: bool,
    pub balance: u64,
    pub length: usize,
}

impl From<&SnakeSnapshot> for SnakeDto {
    fn from(snake: &SnakeSnapshot) -> Self {
        Self {
            id: snake.id.to_string(),
            name: snake.display_name.clone(),
            color: snake.color,
            body: snake.body.iter().map(|p| [p.x, p.y]).collect(),
            heading: snake.heading,
            radius: snake.radius,
            boosting: snake.boosting,
            balance: snake.balance,
            length: snake.length,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FoodDto {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub kind: FoodKindDto,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodKindDto {
    Ambient,
    Remains,
}

impl From<&FoodSnapshot> for FoodDto {
    fn from(food: &FoodSnapshot) -> Self {
        Self {
            id: food.id,
            x: food.x,
            y: food.y,
            radius: food.radius,
            kind: match food.kind {
                FoodKind::Ambient => FoodKindDto::Ambient,
                FoodKind::Remains => FoodKindDto::Remains,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KillDto {
    pub victim_id: String,
    pub killer_id: Option<String>,
    pub transferred_amount: u64,
}

impl From<&KillEvent> for KillDto {
    fn from(event: &KillEvent) -> Self {
        Self {
            victim_id: event.victim_id.to_string(),
            killer_id: event.killer_id.map(|id| id.to_string()),
            transferred_amount: event.transferred_amount,
        }
    }
}
