// Authoritative room state: snakes, food and the per-tick rules that tie them together.

use crate::domain::errors::RoomError;
use crate::domain::food::FoodPool;
use crate::domain::geometry::{Point, WorldBounds};
use crate::domain::snake::{AdvanceOutcome, DeathCause, LifeState, Snake};
use crate::domain::state::{KillEvent, PlayerInput, RoomSnapshot, SnakeSnapshot, TickOutcome};
use crate::domain::tuning::RoomTuning;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::time::Duration;
use tracing::{error, info};

const MAX_DISPLAY_NAME_LEN: usize = 32;
const SPAWN_ATTEMPTS: usize = 16;
const SPAWN_CLEARANCE: f32 = 120.0;

/// Validates a movement command before it is queued or applied.
pub fn validate_input(input: &PlayerInput) -> Result<(), RoomError> {
    if let Some(heading) = input.heading {
        if !heading.is_finite() {
            return Err(RoomError::InvalidInput("heading must be finite"));
        }
        if !(-PI..=PI).contains(&heading) {
            return Err(RoomError::InvalidInput("heading out of range"));
        }
    }
    Ok(())
}

fn validate_join(player_id: u64, display_name: &str) -> Result<(), RoomError> {
    if player_id == 0 {
        return Err(RoomError::InvalidInput("player id must be non-zero"));
    }
    let len = display_name.chars().count();
    if display_name.trim().is_empty() || len > MAX_DISPLAY_NAME_LEN {
        return Err(RoomError::InvalidInput("invalid display name"));
    }
    Ok(())
}

pub struct Room {
    room_id: String,
    tuning: RoomTuning,
    bounds: WorldBounds,
    dt: f32,
    // BTreeMap keeps ascending-id iteration, which is the collision resolution order.
    snakes: BTreeMap<u64, Snake>,
    food: FoodPool,
    rng: Pcg32,
    tick: u64,
}

impl Room {
    pub fn new(
        room_id: impl Into<String>,
        tuning: RoomTuning,
        tick_interval: Duration,
        seed: u64,
    ) -> Self {
        let bounds = tuning.world.bounds();
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut food = FoodPool::new(tuning.food, bounds);
        food.replenish(&mut rng);

        Self {
            room_id: room_id.into(),
            tuning,
            bounds,
            dt: tick_interval.as_secs_f32(),
            snakes: BTreeMap::new(),
            food,
            rng,
            tick: 0,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn player_count(&self) -> usize {
        self.snakes.len()
    }

    pub fn snake(&self, player_id: u64) -> Option<&Snake> {
        self.snakes.get(&player_id)
    }

    pub fn food(&self) -> &FoodPool {
        &self.food
    }

    /// Adds a verified player at a random spawn point.
    pub fn add_player(
        &mut self,
        player_id: u64,
        display_name: &str,
        entry_balance: u64,
    ) -> Result<SnakeSnapshot, RoomError> {
        validate_join(player_id, display_name)?;
        if self.snakes.contains_key(&player_id) {
            return Err(RoomError::AlreadyJoined);
        }

        let head = self.pick_spawn_point();
        let heading = self.rng.random_range(-PI..PI);
        self.spawn_player_at(player_id, display_name, entry_balance, head, heading)
    }

    /// Adds a verified player at an explicit position and heading.
    pub fn spawn_player_at(
        &mut self,
        player_id: u64,
        display_name: &str,
        entry_balance: u64,
        head: Point,
        heading: f32,
    ) -> Result<SnakeSnapshot, RoomError> {
        validate_join(player_id, display_name)?;
        validate_input(&PlayerInput {
            heading: Some(heading),
            boosting: None,
        })?;
        if !head.x.is_finite() || !head.y.is_finite() || !self.bounds.contains(head) {
            return Err(RoomError::InvalidInput("spawn point out of bounds"));
        }
        if self.snakes.contains_key(&player_id) {
            return Err(RoomError::AlreadyJoined);
        }

        let snake = Snake::new(
            player_id,
            display_name.trim(),
            entry_balance,
            head,
            heading,
            &self.tuning.snake,
        );
        let snapshot = snake.snapshot();
        self.snakes.insert(player_id, snake);
        info!(room_id = %self.room_id, player_id, entry_balance, "snake spawned");
        Ok(snapshot)
    }

    /// Removes a player who leaves mid-round.
    ///
    /// The body is dropped as remains like a death, but the balance is returned to the
    /// caller untouched so it can be settled with the ledger.
    pub fn remove_player(&mut self, player_id: u64) -> Result<u64, RoomError> {
        let snake = self
            .snakes
            .remove(&player_id)
            .ok_or(RoomError::UnknownPlayer)?;
        self.food.drop_along_body(snake.body());
        info!(room_id = %self.room_id, player_id, balance = snake.balance(), "snake left");
        Ok(snake.balance())
    }

    pub fn apply_input(&mut self, player_id: u64, input: PlayerInput) -> Result<(), RoomError> {
        validate_input(&input)?;
        let snake = self
            .snakes
            .get_mut(&player_id)
            .ok_or(RoomError::UnknownPlayer)?;
        snake.apply_input(input);
        Ok(())
    }

    /// Advances the room by one fixed step.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick += 1;
        let snake_tuning = self.tuning.snake;
        // Deaths in the order they were discovered; transfers resolve in this order.
        let mut deaths: Vec<u64> = Vec::new();

        // Movement; wall deaths come first and win over any body hit.
        for (id, snake) in self.snakes.iter_mut() {
            match snake.advance(self.dt, &snake_tuning, &self.bounds) {
                AdvanceOutcome::Moved {
                    shed_tail: Some(tail),
                } => self.food.drop_remains(tail),
                AdvanceOutcome::Moved { shed_tail: None } => {}
                AdvanceOutcome::HitWall => deaths.push(*id),
            }
        }

        // Body collisions then food, in ascending id order. A snake marked dead earlier in
        // this pass is a corpse and cannot kill.
        let ids: Vec<u64> = self.snakes.keys().copied().collect();
        for id in ids {
            let Some(snake) = self.snakes.get(&id) else {
                continue;
            };
            if !snake.is_alive() {
                continue;
            }
            let killer = self
                .snakes
                .values()
                .find(|other| snake.collides_with(other))
                .map(Snake::id);

            if let Some(killer_id) = killer {
                if let Some(victim) = self.snakes.get_mut(&id) {
                    victim.kill(DeathCause::Collision { killer_id });
                }
                deaths.push(id);
                continue;
            }

            if let Some(snake) = self.snakes.get_mut(&id) {
                self.food.consume(snake, &mut self.rng);
            }
        }

        let kill_events = self.resolve_deaths(deaths);

        self.food.replenish(&mut self.rng);

        for snake in self.snakes.values_mut() {
            if snake.enforce_invariants(&snake_tuning) {
                error!(
                    room_id = %self.room_id,
                    player_id = snake.id(),
                    tick = self.tick,
                    "snake body invariant repaired"
                );
            }
        }

        TickOutcome {
            snapshot: self.snapshot(),
            kill_events,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            tick: self.tick,
            world_size: self.bounds.size,
            snakes: self.snakes.values().map(Snake::snapshot).collect(),
            food: self.food.snapshot(),
        }
    }

    // Single economy policy: the killer receives the victim's whole balance, remains are
    // cosmetic, and wall deaths leave the balance with the house.
    fn resolve_deaths(&mut self, deaths: Vec<u64>) -> Vec<KillEvent> {
        let mut events = Vec::with_capacity(deaths.len());

        for victim_id in deaths {
            let Some(mut victim) = self.snakes.remove(&victim_id) else {
                continue;
            };
            let killer_id = match victim.state() {
                LifeState::Dead(DeathCause::Collision { killer_id }) => Some(killer_id),
                _ => None,
            };
            let amount = victim.take_balance();

            if let Some(killer_id) = killer_id {
                match self.snakes.get_mut(&killer_id) {
                    Some(killer) => killer.grow(amount),
                    None => error!(
                        room_id = %self.room_id,
                        victim_id,
                        killer_id,
                        amount,
                        "killer missing during kill resolution"
                    ),
                }
            }

            self.food.drop_along_body(victim.body());
            info!(
                room_id = %self.room_id,
                tick = self.tick,
                victim_id,
                killer_id = ?killer_id,
                amount,
                "snake died"
            );

            events.push(KillEvent {
                victim_id,
                killer_id,
                transferred_amount: amount,
            });
        }

        events
    }

    fn pick_spawn_point(&mut self) -> Point {
        let size = self.bounds.size;
        let margin = self.tuning.snake.spawn_margin.min(size / 4.0);
        let clearance_sq = SPAWN_CLEARANCE * SPAWN_CLEARANCE;

        let mut candidate = Point::new(size / 2.0, size / 2.0);
        for _ in 0..SPAWN_ATTEMPTS {
            candidate = Point::new(
                self.rng.random_range(margin..=size - margin),
                self.rng.random_range(margin..=size - margin),
            );
            let crowded = self.snakes.values().any(|snake| {
                snake
                    .body()
                    .iter()
                    .any(|segment| segment.distance_squared(candidate) < clearance_sq)
            });
            if !crowded {
                break;
            }
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::food::FoodKind;
    use crate::domain::tuning::FoodTuning;
    use proptest::prelude::*;

    const TICK: Duration = Duration::from_millis(50);

    fn tuning_without_food() -> RoomTuning {
        RoomTuning {
            food: FoodTuning {
                target_count: 0,
                ..FoodTuning::default()
            },
            ..RoomTuning::default()
        }
    }

    fn total_balance(room: &Room) -> u64 {
        room.snakes.values().map(Snake::balance).sum()
    }

    #[test]
    fn head_into_body_transfers_the_victim_balance_to_the_owner() {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 1);
        assert_eq!(room.snapshot().world_size, 3000.0);

        room.spawn_player_at(1, "A", 10, Point::new(1000.0, 1000.0), 0.0)
            .expect("spawn A");
        let target = room.snake(1).expect("A").body()[5];
        // B heads straight down through the middle of A's body.
        room.spawn_player_at(2, "B", 5, Point::new(target.x, target.y - 5.0), PI / 2.0)
            .expect("spawn B");

        let outcome = room.tick();

        assert_eq!(
            outcome.kill_events,
            vec![KillEvent {
                victim_id: 2,
                killer_id: Some(1),
                transferred_amount: 5,
            }]
        );
        assert_eq!(room.snake(1).expect("A alive").balance(), 15);
        assert!(room.snake(2).is_none());
        assert_eq!(total_balance(&room), 15);
        assert!(outcome.snapshot.snakes.iter().all(|s| s.id != 2));

        // Remains mark the body but carry no balance.
        assert!(room.food().remains_count() > 0);
        assert!(room.food().iter().all(|f| f.kind == FoodKind::Remains && f.value == 0));
    }

    #[test]
    fn wall_death_has_no_killer_and_forfeits_balance() {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 1);
        room.spawn_player_at(7, "Edge", 12, Point::new(500.0, 500.0), PI)
            .expect("spawn");
        room.snakes.get_mut(&7).expect("snake").body[0] = Point::new(-1.0, 500.0);

        let outcome = room.tick();

        assert_eq!(
            outcome.kill_events,
            vec![KillEvent {
                victim_id: 7,
                killer_id: None,
                transferred_amount: 12,
            }]
        );
        assert_eq!(room.player_count(), 0);
    }

    #[test]
    fn corpse_cannot_kill_later_snakes_in_the_same_tick() {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 1);
        room.spawn_player_at(2, "B", 3, Point::new(1000.0, 1000.0), 0.0)
            .expect("spawn B");
        let b_mid = room.snake(2).expect("B").body()[5];
        room.spawn_player_at(1, "A", 4, b_mid, PI / 2.0)
            .expect("spawn A");
        let a_mid = room.snake(1).expect("A").body()[5];
        room.spawn_player_at(3, "C", 6, a_mid, PI).expect("spawn C");

        let outcome = room.tick();

        assert_eq!(
            outcome.kill_events,
            vec![KillEvent {
                victim_id: 1,
                killer_id: Some(2),
                transferred_amount: 4,
            }]
        );
        assert_eq!(room.snake(2).expect("B").balance(), 7);
        assert_eq!(room.snake(3).expect("C").balance(), 6);
    }

    #[test]
    fn leave_returns_balance_and_drops_remains() {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 1);
        room.add_player(9, "Leaver", 42).expect("join");

        let balance = room.remove_player(9).expect("member");

        assert_eq!(balance, 42);
        assert_eq!(room.player_count(), 0);
        assert!(room.food().remains_count() > 0);
        assert_eq!(room.remove_player(9), Err(RoomError::UnknownPlayer));
    }

    #[test]
    fn joins_and_inputs_are_validated() {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 1);
        room.add_player(1, "Viper", 5).expect("join");

        assert_eq!(room.add_player(1, "Again", 5), Err(RoomError::AlreadyJoined));
        assert!(matches!(
            room.add_player(2, "   ", 5),
            Err(RoomError::InvalidInput(_))
        ));
        assert!(matches!(
            room.add_player(0, "Zero", 5),
            Err(RoomError::InvalidInput(_))
        ));

        let bad = PlayerInput {
            heading: Some(f32::NAN),
            boosting: None,
        };
        assert!(matches!(room.apply_input(1, bad), Err(RoomError::InvalidInput(_))));
        let wide = PlayerInput {
            heading: Some(7.0),
            boosting: None,
        };
        assert!(matches!(room.apply_input(1, wide), Err(RoomError::InvalidInput(_))));
        assert_eq!(
            room.apply_input(99, PlayerInput::default()),
            Err(RoomError::UnknownPlayer)
        );
    }

    #[test]
    fn ambient_food_count_is_stable_across_ticks() {
        let mut room = Room::new("arena", RoomTuning::default(), TICK, 3);
        let target = RoomTuning::default().food.target_count;
        assert_eq!(room.food().ambient_count(), target);

        room.spawn_player_at(1, "Eater", 0, Point::new(1500.0, 1500.0), 0.0)
            .expect("spawn");
        // Extra pellets right in the snake's path.
        for step in 1..6 {
            let p = Point::new(1500.0 + step as f32 * 10.0, 1500.0);
            room.food.spawn(Some(p), &mut room.rng);
        }
        let expected = target + 5;

        for _ in 0..10 {
            room.tick();
            assert_eq!(room.food().ambient_count(), expected);
        }
        assert!(room.snake(1).expect("eater").balance() >= 5);
    }

    #[test]
    fn remains_under_the_head_do_not_block_ambient_food() {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 3);
        room.spawn_player_at(1, "Eater", 0, Point::new(1500.0, 1500.0), 0.0)
            .expect("spawn");
        room.food.drop_remains(Point::new(1510.0, 1500.0));
        room.food.spawn(Some(Point::new(1510.0, 1501.0)), &mut room.rng);

        room.tick();

        assert_eq!(room.snake(1).expect("eater").balance(), 1);
        assert_eq!(room.food().remains_count(), 0);
    }

    #[test]
    fn same_seed_and_inputs_give_identical_rooms() {
        let run = || {
            let mut room = Room::new("arena", RoomTuning::default(), TICK, 99);
            room.add_player(1, "A", 30).expect("join A");
            room.add_player(2, "B", 30).expect("join B");
            for tick in 0..40 {
                let heading = ((tick as f32) * 0.3).sin() * PI;
                let _ = room.apply_input(
                    1,
                    PlayerInput {
                        heading: Some(heading),
                        boosting: Some(tick % 10 < 5),
                    },
                );
                room.tick();
            }
            room.snapshot()
        };

        let first = run();
        let second = run();
        assert_eq!(first.snakes.len(), second.snakes.len());
        for (a, b) in first.snakes.iter().zip(second.snakes.iter()) {
            assert_eq!(a.body, b.body);
            assert_eq!(a.balance, b.balance);
        }
        assert_eq!(first.food.len(), second.food.len());
    }

    fn crowded_room(balances: &[u64]) -> Room {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 5);
        for (i, balance) in balances.iter().enumerate() {
            let id = i as u64 + 1;
            let head = Point::new(1400.0 + (i as f32) * 40.0, 1400.0 + (i % 2) as f32 * 40.0);
            room.spawn_player_at(id, "Bot", *balance, head, (i as f32) * 1.3 - PI / 2.0)
                .expect("spawn");
        }
        room
    }

    // Snakes far enough apart, heading down the middle, that 80 boosted ticks never meet
    // another body or a wall.
    fn spread_room(balances: &[u64]) -> Room {
        let mut room = Room::new("arena", tuning_without_food(), TICK, 5);
        for (i, balance) in balances.iter().enumerate() {
            let id = i as u64 + 1;
            let head = Point::new(600.0 + (i as f32) * 900.0, 700.0);
            room.spawn_player_at(id, "Bot", *balance, head, PI / 2.0)
                .expect("spawn");
        }
        room
    }

    proptest! {
        #[test]
        fn kills_conserve_balance(
            balances in prop::collection::vec(0u64..500, 2..5),
            headings in prop::collection::vec(-3.1f32..3.1, 60),
        ) {
            let mut room = crowded_room(&balances);
            let ids: Vec<u64> = (1..=balances.len() as u64).collect();

            for (tick, heading) in headings.iter().enumerate() {
                let mover = ids[tick % ids.len()];
                let _ = room.apply_input(mover, PlayerInput { heading: Some(*heading), boosting: None });

                let before = total_balance(&room);
                let outcome = room.tick();
                let forfeited: u64 = outcome
                    .kill_events
                    .iter()
                    .filter(|event| event.killer_id.is_none())
                    .map(|event| event.transferred_amount)
                    .sum();

                prop_assert_eq!(total_balance(&room) + forfeited, before);
                for snake in room.snakes.values() {
                    prop_assert!(snake.body().len() >= room.tuning.snake.min_length);
                }
            }
        }

        #[test]
        fn boosting_only_ever_costs_exactly_one_charge_per_tick(
            balances in prop::collection::vec(0u64..20, 1..4),
            boosts in prop::collection::vec(any::<bool>(), 80),
        ) {
            let mut room = spread_room(&balances);
            let ids: Vec<u64> = (1..=balances.len() as u64).collect();
            let cost = room.tuning.snake.boost_cost;

            for (tick, boost) in boosts.iter().enumerate() {
                for id in &ids {
                    let _ = room.apply_input(*id, PlayerInput { heading: None, boosting: Some(*boost) });
                }
                let before: BTreeMap<u64, u64> =
                    room.snakes.iter().map(|(id, s)| (*id, s.balance())).collect();

                let outcome = room.tick();

                prop_assert!(outcome.kill_events.is_empty(), "tick {}", tick);
                prop_assert_eq!(room.player_count(), ids.len());
                for (id, snake) in &room.snakes {
                    prop_assert!(snake.body().len() >= room.tuning.snake.min_length);
                    let prev = before[id];
                    // No food and no kills: a tick either costs nothing or one charge.
                    prop_assert!(
                        snake.balance() == prev || snake.balance() + cost == prev,
                        "tick {}: snake {} went from {} to {}",
                        tick,
                        id,
                        prev,
                        snake.balance()
                    );
                }
            }
        }
    }
}
