// Use cases layer: room loops, the room registry and the tick scheduler.

pub mod game;
pub mod rooms;
pub mod types;

pub use rooms::{InputDelivery, RegistryError, RoomHandle, RoomRegistry, RoomSettings};
pub use types::{GameEvent, OrphanedBalance, RoomUpdate};
