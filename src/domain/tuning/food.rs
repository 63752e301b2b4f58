/// Gameplay tuning for food pellets.

#[derive(Debug, Clone, Copy)]
pub struct FoodTuning {
    /// Ambient pellets kept alive in every room.
    pub target_count: usize,

    /// Balance credited by an ambient pellet.
    pub value: u64,

    /// Collision radius of an ambient pellet.
    pub radius: f32,

    /// Collision radius of a remains pellet.
    pub remains_radius: f32,

    /// One remains pellet is dropped per this many body segments.
    pub remains_stride: usize,

    /// Upper bound on remains dropped by a single body.
    pub max_remains_per_drop: usize,

    /// Upper bound on remains lying in a room; the oldest are evicted first.
    pub max_remains: usize,

    /// Maximum jitter applied to dropped remains.
    pub remains_jitter: f32,
}

impl Default for FoodTuning {
    fn default() -> Self {
        Self {
            target_count: 600,
            value: 1,
            radius: 5.0,
            remains_radius: 7.0,
            remains_stride: 2,
            max_remains_per_drop: 120,
            max_remains: 1500,
            remains_jitter: 4.0,
        }
    }
}
