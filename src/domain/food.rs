// Per-room food pool: ambient pellets at a fixed target count plus cosmetic remains.

use crate::domain::geometry::{Point, WorldBounds};
use crate::domain::snake::Snake;
use crate::domain::state::FoodSnapshot;
use crate::domain::tuning::FoodTuning;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodKind {
    // House-funded pellet, replaced as soon as it is eaten.
    Ambient,
    // Marker left by a dead or departed body; carries no balance.
    Remains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub id: u64,
    pub pos: Point,
    pub radius: f32,
    pub value: u64,
    pub kind: FoodKind,
}

pub struct FoodPool {
    tuning: FoodTuning,
    bounds: WorldBounds,
    // Insertion order doubles as the tie-break order for consumption.
    pellets: Vec<Food>,
    next_id: u64,
    ambient: usize,
    remains: usize,
}

impl FoodPool {
    pub fn new(tuning: FoodTuning, bounds: WorldBounds) -> Self {
        Self {
            tuning,
            bounds,
            pellets: Vec::with_capacity(tuning.target_count),
            next_id: 1,
            ambient: 0,
            remains: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pellets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pellets.is_empty()
    }

    pub fn ambient_count(&self) -> usize {
        self.ambient
    }

    pub fn remains_count(&self) -> usize {
        self.remains
    }

    pub fn iter(&self) -> impl Iterator<Item = &Food> {
        self.pellets.iter()
    }

    /// Adds one ambient pellet at `position` (clamped in bounds) or at a random spot.
    pub fn spawn<R: Rng>(&mut self, position: Option<Point>, rng: &mut R) -> u64 {
        let pos = match position {
            Some(p) => self.bounds.clamp(p),
            None => self.random_position(rng),
        };
        self.ambient += 1;
        self.push(pos, self.tuning.radius, self.tuning.value, FoodKind::Ambient)
    }

    /// Tops ambient pellets back up to the target count.
    pub fn replenish<R: Rng>(&mut self, rng: &mut R) {
        while self.ambient < self.tuning.target_count {
            self.spawn(None, rng);
        }
    }

    /// Eats the first ambient pellet under the snake's head, in insertion order.
    ///
    /// At most one ambient pellet is consumed per call. An eaten ambient pellet is
    /// replaced immediately so the ambient count never dips. Remains under the head are
    /// swept away on contact and never take that slot.
    pub fn consume<R: Rng>(&mut self, snake: &mut Snake, rng: &mut R) -> Option<Food> {
        let head = snake.head();
        let reach = snake.radius();
        let touches = |food: &Food| {
            let r = reach + food.radius;
            head.distance_squared(food.pos) < r * r
        };

        let before = self.pellets.len();
        self.pellets.retain(|food| food.kind != FoodKind::Remains || !touches(food));
        self.remains -= before - self.pellets.len();

        let idx = self
            .pellets
            .iter()
            .position(|food| food.kind == FoodKind::Ambient && touches(food))?;
        let food = self.pellets.remove(idx);
        self.ambient -= 1;
        self.spawn(None, rng);
        snake.grow(food.value);
        Some(food)
    }

    /// Scatters cosmetic remains along a body; returns how many were dropped.
    pub fn drop_along_body(&mut self, body: &[Point]) -> usize {
        if body.is_empty() {
            return 0;
        }

        let stride = self.tuning.remains_stride.max(1);
        let count = body
            .len()
            .div_ceil(stride)
            .min(self.tuning.max_remains_per_drop)
            .max(1);
        let jitter = self.tuning.remains_jitter;

        for k in 0..count {
            let anchor = body[(k * body.len()) / count];
            // Deterministic scatter so replays produce identical remains.
            let jx = (k as f32 * 12.9898).sin() * jitter;
            let jy = (k as f32 * 78.233).cos() * jitter;
            self.drop_remains(Point::new(anchor.x + jx, anchor.y + jy));
        }
        count
    }

    /// Leaves a single remains pellet, evicting the oldest remains past the room cap.
    pub fn drop_remains(&mut self, pos: Point) {
        let pos = self.bounds.clamp(pos);
        self.remains += 1;
        self.push(pos, self.tuning.remains_radius, 0, FoodKind::Remains);

        while self.remains > self.tuning.max_remains {
            match self
                .pellets
                .iter()
                .position(|food| food.kind == FoodKind::Remains)
            {
                Some(oldest) => {
                    self.pellets.remove(oldest);
                    self.remains -= 1;
                }
                None => break,
            }
        }
    }

    pub fn snapshot(&self) -> Vec<FoodSnapshot> {
        self.pellets
            .iter()
            .map(|food| FoodSnapshot {
                id: food.id,
                x: food.pos.x,
                y: food.pos.y,
                radius: food.radius,
                kind: food.kind,
            })
            .collect()
    }

    fn push(&mut self, pos: Point, radius: f32, value: u64, kind: FoodKind) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.pellets.push(Food {
            id,
            pos,
            radius,
            value,
            kind,
        });
        id
    }

    fn random_position<R: Rng>(&self, rng: &mut R) -> Point {
        Point::new(
            rng.random_range(0.0..=self.bounds.size),
            rng.random_range(0.0..=self.bounds.size),
        )
    }
}
