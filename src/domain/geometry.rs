// Plane geometry helpers shared by the snake, food and room rules.

use std::f32::consts::{PI, TAU};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Moves `distance` units along `angle` (0 rad = +X, positive = towards +Y).
    pub fn offset(self, angle: f32, distance: f32) -> Point {
        Point::new(self.x + angle.cos() * distance, self.y + angle.sin() * distance)
    }
}

/// Square world `[0, size]²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub size: f32,
}

impl WorldBounds {
    pub fn contains(&self, p: Point) -> bool {
        (0.0..=self.size).contains(&p.x) && (0.0..=self.size).contains(&p.y)
    }

    pub fn clamp(&self, p: Point) -> Point {
        Point::new(p.x.clamp(0.0, self.size), p.y.clamp(0.0, self.size))
    }
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

/// Rotates `current` towards `target` along the shortest arc, at most `max_step` radians.
pub fn turn_towards(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = wrap_angle(target - current);
    if delta.abs() <= max_step {
        wrap_angle(target)
    } else {
        wrap_angle(current + max_step.copysign(delta))
    }
}

/// One tail-first relaxation pass over a chain whose head has already moved.
///
/// Each follower is pulled toward (or pushed away from) its leader by `stiffness` times
/// the spacing error, so a moving chain stretches and catches up over a few passes
/// instead of replaying the head's path. `fallback_angle` is used when a follower sits
/// on its leader.
pub fn relax_chain(chain: &mut [Point], spacing: f32, stiffness: f32, fallback_angle: f32) {
    let stiffness = stiffness.clamp(0.0, 1.0);
    for i in (1..chain.len()).rev() {
        let leader = chain[i - 1];
        let follower = chain[i];
        let dist = leader.distance(follower);
        chain[i] = if dist > f32::EPSILON {
            // Positive error pulls toward the leader, negative pushes away.
            let t = stiffness * (dist - spacing) / dist;
            Point::new(
                follower.x + (leader.x - follower.x) * t,
                follower.y + (leader.y - follower.y) * t,
            )
        } else {
            leader.offset(fallback_angle, spacing * stiffness)
        };
    }
}
