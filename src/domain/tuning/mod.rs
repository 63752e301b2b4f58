// Gameplay tuning grouped per concern.
//
// Every rate here is tuned against the fixed tick period in `frameworks::config`;
// if the period changes, turn rate, speeds and boost cadence must be rescaled together.

pub mod food;
pub mod snake;
pub mod world;

pub use food::FoodTuning;
pub use snake::SnakeTuning;
pub use world::WorldTuning;

/// Complete tuning set for one room.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomTuning {
    pub world: WorldTuning,
    pub snake: SnakeTuning,
    pub food: FoodTuning,
}
