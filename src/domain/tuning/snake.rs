/// Gameplay tuning for player snakes.
///
/// Keep this separate from runtime/server configuration (tick rates, buffer sizes, etc.).

#[derive(Debug, Clone, Copy)]
pub struct SnakeTuning {
    /// Cruise speed in world units per second.
    pub base_speed: f32,

    /// Speed while boosting, in world units per second.
    pub boost_speed: f32,

    /// Maximum heading change in radians per second.
    pub turn_rate: f32,

    /// Target distance between consecutive body segments.
    pub segment_spacing: f32,

    /// Fraction of the spacing error corrected per relaxation pass, in `(0, 1]`.
    pub relax_stiffness: f32,

    /// Tail-first relaxation passes per tick.
    pub relax_passes: u32,

    /// Body segments a snake never shrinks below.
    pub min_length: usize,

    /// Segments granted before any balance is counted.
    pub base_length: usize,

    /// Hard cap on body segments; balance keeps accruing past it.
    pub max_length: usize,

    /// Balance units per extra body segment.
    pub balance_per_segment: u64,

    /// Collision radius at `min_length`.
    pub base_radius: f32,

    /// Collision radius at `max_length`.
    pub max_radius: f32,

    /// Balance required before boosting takes effect.
    pub boost_min_balance: u64,

    /// Balance charged per boost charge.
    pub boost_cost: u64,

    /// Ticks of continuous boosting between charges.
    pub boost_cost_interval_ticks: u32,

    /// Distance kept between a fresh spawn and the world edge.
    pub spawn_margin: f32,
}

impl Default for SnakeTuning {
    fn default() -> Self {
        Self {
            base_speed: 200.0,
            boost_speed: 400.0,
            turn_rate: 4.0,
            segment_spacing: 10.0,
            relax_stiffness: 0.5,
            relax_passes: 4,
            min_length: 10,
            base_length: 10,
            max_length: 400,
            balance_per_segment: 1,
            base_radius: 12.0,
            max_radius: 28.0,
            boost_min_balance: 1,
            boost_cost: 1,
            boost_cost_interval_ticks: 4,
            spawn_margin: 300.0,
        }
    }
}
