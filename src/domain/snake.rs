// Player snake: body chain, steering/boost state machine and growth rules.

use crate::domain::geometry::{Point, WorldBounds, relax_chain, turn_towards, wrap_angle};
use crate::domain::state::{PlayerInput, SnakeSnapshot};
use crate::domain::tuning::SnakeTuning;
use std::f32::consts::PI;

const PALETTE: [&str; 8] = [
    "#ff6b6b", "#ffd166", "#06d6a0", "#4dabf7", "#f06595", "#845ef7", "#20c997", "#fcc419",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Wall,
    Collision { killer_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    Dead(DeathCause),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvanceOutcome {
    // `shed_tail` is the segment dropped by a boost charge, if any.
    Moved { shed_tail: Option<Point> },
    HitWall,
}

pub struct Snake {
    pub(crate) id: u64,
    pub(crate) display_name: String,
    pub(crate) color: &'static str,

    pub(crate) heading: f32,
    pub(crate) target_heading: f32,
    pub(crate) speed: f32,
    // Requested by the player.
    pub(crate) boosting: bool,
    // Whether boost actually applied on the last advance.
    pub(crate) boost_active: bool,
    // Position inside the boost charge cycle; 0 means the next boosted tick charges.
    pub(crate) boost_ticks: u32,

    pub(crate) body: Vec<Point>,
    pub(crate) radius: f32,
    pub(crate) balance: u64,
    pub(crate) state: LifeState,
}

impl Snake {
    /// Spawns a snake at `head` with a straight `min_length` body trailing behind it.
    pub fn new(
        id: u64,
        display_name: impl Into<String>,
        balance: u64,
        head: Point,
        heading: f32,
        tuning: &SnakeTuning,
    ) -> Self {
        let heading = wrap_angle(heading);
        let behind = heading + PI;
        let body = (0..tuning.min_length.max(1))
            .map(|i| head.offset(behind, i as f32 * tuning.segment_spacing))
            .collect();

        let mut snake = Self {
            id,
            display_name: display_name.into(),
            color: PALETTE[(id % PALETTE.len() as u64) as usize],
            heading,
            target_heading: heading,
            speed: tuning.base_speed,
            boosting: false,
            boost_active: false,
            boost_ticks: 0,
            body,
            radius: tuning.base_radius,
            balance,
            state: LifeState::Alive,
        };
        snake.radius = snake.radius_for_length(tuning);
        snake
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn head(&self) -> Point {
        self.body[0]
    }

    pub fn body(&self) -> &[Point] {
        &self.body
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn state(&self) -> LifeState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state == LifeState::Alive
    }

    pub fn apply_input(&mut self, input: PlayerInput) {
        if let Some(heading) = input.heading {
            self.target_heading = wrap_angle(heading);
        }
        if let Some(boosting) = input.boosting {
            self.boosting = boosting;
        }
    }

    /// Body length the current balance pays for.
    pub fn desired_length(&self, tuning: &SnakeTuning) -> usize {
        let paid = self.balance / tuning.balance_per_segment.max(1);
        let paid = usize::try_from(paid).unwrap_or(usize::MAX);
        tuning
            .base_length
            .saturating_add(paid)
            .min(tuning.max_length)
            .max(tuning.min_length)
    }

    /// Credits balance; body length follows over the next ticks, capped at `max_length`.
    pub fn grow(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Moves the whole balance out of the snake.
    pub fn take_balance(&mut self) -> u64 {
        std::mem::take(&mut self.balance)
    }

    pub fn kill(&mut self, cause: DeathCause) {
        self.state = LifeState::Dead(cause);
    }

    /// One simulation step.
    pub fn advance(
        &mut self,
        dt: f32,
        tuning: &SnakeTuning,
        bounds: &WorldBounds,
    ) -> AdvanceOutcome {
        debug_assert!(self.is_alive(), "advancing a dead snake");

        if !bounds.contains(self.head()) {
            self.kill(DeathCause::Wall);
            return AdvanceOutcome::HitWall;
        }

        // Speed selection and boost economy.
        let mut charged = false;
        let mut shed_tail = None;
        self.boost_active = false;
        if self.boosting && self.balance >= tuning.boost_min_balance {
            if self.boost_ticks == 0 {
                if let Some(rest) = self.balance.checked_sub(tuning.boost_cost) {
                    self.balance = rest;
                    self.boost_active = true;
                    charged = true;
                    if self.body.len() > tuning.min_length {
                        shed_tail = self.body.pop();
                    }
                }
            } else {
                self.boost_active = true;
            }
        }
        if self.boost_active {
            self.boost_ticks = (self.boost_ticks + 1) % tuning.boost_cost_interval_ticks.max(1);
        } else {
            self.boost_ticks = 0;
        }
        self.speed = if self.boost_active {
            tuning.boost_speed
        } else {
            tuning.base_speed
        };

        // Steering.
        self.heading = turn_towards(self.heading, self.target_heading, tuning.turn_rate * dt);

        // Head.
        self.body[0] = self.head().offset(self.heading, self.speed * dt);

        // Length follows balance.
        let desired = self.desired_length(tuning);
        if !charged && self.body.len() < desired {
            let tail = self.body[self.body.len() - 1];
            let outward = match self.body.len() {
                0 | 1 => self.heading + PI,
                n => {
                    let before = self.body[n - 2];
                    (tail.y - before.y).atan2(tail.x - before.x)
                }
            };
            self.body.push(tail.offset(outward, tuning.segment_spacing));
        } else if self.body.len() > desired {
            self.body.truncate(desired);
        }

        for _ in 0..tuning.relax_passes.max(1) {
            relax_chain(
                &mut self.body,
                tuning.segment_spacing,
                tuning.relax_stiffness,
                self.heading + PI,
            );
        }
        self.radius = self.radius_for_length(tuning);

        if !bounds.contains(self.head()) {
            self.kill(DeathCause::Wall);
            return AdvanceOutcome::HitWall;
        }

        AdvanceOutcome::Moved { shed_tail }
    }

    /// True when this snake's head overlaps any of `other`'s segments behind its head.
    pub fn collides_with(&self, other: &Snake) -> bool {
        if self.id == other.id || !other.is_alive() {
            return false;
        }
        let head = self.head();
        let reach = self.radius + other.radius;
        let reach_sq = reach * reach;
        other
            .body
            .iter()
            .skip(1)
            .any(|segment| head.distance_squared(*segment) < reach_sq)
    }

    /// Checks the body invariants after a tick.
    ///
    /// Debug builds assert; release builds pad the body back to `min_length` and report
    /// that a repair happened so the caller can log it.
    pub fn enforce_invariants(&mut self, tuning: &SnakeTuning) -> bool {
        let healthy = self.body.len() >= tuning.min_length.max(1);
        debug_assert!(
            healthy,
            "snake {} body has {} segments",
            self.id,
            self.body.len()
        );
        if healthy {
            return false;
        }

        let anchor = self.body.last().copied().unwrap_or_default();
        while self.body.len() < tuning.min_length.max(1) {
            self.body.push(anchor);
        }
        true
    }

    pub fn snapshot(&self) -> SnakeSnapshot {
        SnakeSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            color: self.color,
            body: self.body.clone(),
            heading: self.heading,
            radius: self.radius,
            boosting: self.boost_active,
            balance: self.balance,
            length: self.body.len(),
        }
    }

    fn radius_for_length(&self, tuning: &SnakeTuning) -> f32 {
        let span = tuning.max_length.saturating_sub(tuning.min_length).max(1) as f32;
        let grown = self.body.len().saturating_sub(tuning.min_length) as f32;
        let t = (grown / span).clamp(0.0, 1.0);
        tuning.base_radius + (tuning.max_radius - tuning.base_radius) * t
    }
}
