// Domain layer: core simulation types and rules.

pub mod errors;
pub mod food;
pub mod geometry;
pub mod room;
pub mod snake;
pub mod state;
pub mod tuning;

pub use errors::RoomError;
pub use food::FoodKind;
pub use geometry::Point;
pub use room::Room;
pub use state::{FoodSnapshot, KillEvent, PlayerInput, RoomSnapshot, SnakeSnapshot, TickOutcome};
