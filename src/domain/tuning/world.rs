use crate::domain::geometry::WorldBounds;

/// World dimensions for a room.
#[derive(Debug, Clone, Copy)]
pub struct WorldTuning {
    /// Side length of the square world.
    pub size: f32,
}

impl WorldTuning {
    pub fn bounds(&self) -> WorldBounds {
        WorldBounds { size: self.size }
    }
}

impl Default for WorldTuning {
    fn default() -> Self {
        Self { size: 3000.0 }
    }
}
