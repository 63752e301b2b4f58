// Room registry and per-room handles.

use crate::domain::room::validate_input;
use crate::domain::tuning::RoomTuning;
use crate::domain::{KillEvent, PlayerInput, Room, RoomError, SnakeSnapshot};
use crate::use_cases::game::{room_task, tick_scheduler};
use crate::use_cases::{GameEvent, OrphanedBalance, RoomUpdate};
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};

// Frames buffered per room before it counts as lagging.
const TICK_BROADCAST_CAPACITY: usize = 8;

/// Shared configuration for spawning room tasks.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Capacity for queued join/leave/input events per room.
    pub event_channel_capacity: usize,
    /// Capacity for broadcast room updates.
    pub update_broadcast_capacity: usize,
    /// Fixed tick interval for every room.
    pub tick_interval: Duration,
    /// Gameplay tuning applied to new rooms.
    pub tuning: RoomTuning,
    /// Base seed; each room gets the next value in creation order.
    pub seed: u64,
}

/// Errors returned by room registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// Room already exists and cannot be re-created.
    AlreadyExists,
}

/// Outcome of handing an input to a room queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDelivery {
    Queued,
    /// The queue was full; the input was dropped.
    Dropped,
}

/// Per-room channels.
#[derive(Clone)]
pub struct RoomHandle {
    /// Identifier clients use to target this room.
    pub room_id: Arc<str>,
    /// Sender for events into the room task.
    pub event_tx: mpsc::Sender<GameEvent>,
    /// Broadcast sender for raw room updates.
    pub update_tx: broadcast::Sender<RoomUpdate>,
    /// Broadcast sender for serialized room updates.
    pub update_bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Watch sender holding the latest serialized room update.
    pub update_latest_tx: watch::Sender<Utf8Bytes>,
    /// Broadcast sender for kill events, so sessions can react to their own death.
    pub kill_tx: broadcast::Sender<KillEvent>,
    shutdown: Arc<Notify>,
}

impl RoomHandle {
    /// Queues a join and waits for the next tick to apply it.
    ///
    /// If this future is dropped after the join is queued, the room removes the snake
    /// again and publishes its balance on the registry's orphan channel.
    pub async fn join(
        &self,
        player_id: u64,
        display_name: String,
        entry_balance: u64,
        session_id: String,
    ) -> Result<SnakeSnapshot, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.event_tx
            .send(GameEvent::Join {
                player_id,
                display_name,
                entry_balance,
                session_id,
                reply,
            })
            .await
            .map_err(|_| RoomError::RoomClosed)?;
        rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    /// Validates and queues a movement input without waiting.
    pub fn apply_input(
        &self,
        player_id: u64,
        input: PlayerInput,
    ) -> Result<InputDelivery, RoomError> {
        validate_input(&input)?;
        match self.event_tx.try_send(GameEvent::Input { player_id, input }) {
            Ok(()) => Ok(InputDelivery::Queued),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(InputDelivery::Dropped),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RoomError::RoomClosed),
        }
    }

    /// Queues a leave and returns the player's balance once the room applied it.
    pub async fn leave(&self, player_id: u64) -> Result<u64, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.event_tx
            .send(GameEvent::Leave { player_id, reply })
            .await
            .map_err(|_| RoomError::RoomClosed)?;
        rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    /// Stops the room task after its current tick.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Thread-safe registry for active rooms.
pub struct RoomRegistry {
    /// Global settings applied to newly created rooms.
    settings: RoomSettings,
    /// Map of room id to active handle.
    rooms: RwLock<HashMap<String, RoomHandle>>,
    /// Frame clock shared by every room task.
    tick_tx: broadcast::Sender<u64>,
    /// Balances of joins nobody waited for, from every room.
    orphan_tx: broadcast::Sender<OrphanedBalance>,
    next_seed: AtomicU64,
}

impl RoomRegistry {
    /// Creates a new registry with the provided settings.
    pub fn new(settings: RoomSettings) -> Self {
        let (tick_tx, _tick_rx) = broadcast::channel::<u64>(TICK_BROADCAST_CAPACITY);
        let (orphan_tx, _orphan_rx) =
            broadcast::channel::<OrphanedBalance>(settings.event_channel_capacity);
        let next_seed = AtomicU64::new(settings.seed);
        Self {
            settings,
            rooms: RwLock::new(HashMap::new()),
            tick_tx,
            orphan_tx,
            next_seed,
        }
    }

    /// Subscribes to balances left behind by abandoned joins.
    pub fn subscribe_orphans(&self) -> broadcast::Receiver<OrphanedBalance> {
        self.orphan_tx.subscribe()
    }

    /// Starts the shared fixed-rate clock.
    pub fn spawn_tick_scheduler(&self) -> JoinHandle<()> {
        tokio::spawn(tick_scheduler(
            self.tick_tx.clone(),
            self.settings.tick_interval,
        ))
    }

    /// Creates a new room and spawns its task.
    pub async fn create_room(&self, room_id: String) -> Result<RoomHandle, RegistryError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room_id) {
            return Err(RegistryError::AlreadyExists);
        }

        // Channel wiring for the room task.
        let (event_tx, event_rx) =
            mpsc::channel::<GameEvent>(self.settings.event_channel_capacity);
        let (update_tx, _update_rx) =
            broadcast::channel::<RoomUpdate>(self.settings.update_broadcast_capacity);
        let (update_bytes_tx, _update_bytes_rx) =
            broadcast::channel::<Utf8Bytes>(self.settings.update_broadcast_capacity);
        let (update_latest_tx, _update_latest_rx) =
            watch::channel::<Utf8Bytes>(Utf8Bytes::from(""));
        let (kill_tx, _kill_rx) =
            broadcast::channel::<KillEvent>(self.settings.update_broadcast_capacity);
        let shutdown = Arc::new(Notify::new());

        let seed = self.next_seed.fetch_add(1, Ordering::Relaxed);
        let room = Room::new(
            room_id.clone(),
            self.settings.tuning,
            self.settings.tick_interval,
            seed,
        );

        // Spawn the authoritative loop for this room.
        tokio::spawn(
            room_task(
                room,
                event_rx,
                self.tick_tx.subscribe(),
                update_tx.clone(),
                kill_tx.clone(),
                self.orphan_tx.clone(),
                shutdown.clone(),
            )
            .instrument(info_span!("room", room_id = %room_id)),
        );

        let handle = RoomHandle {
            room_id: Arc::from(room_id.as_str()),
            event_tx,
            update_tx,
            update_bytes_tx,
            update_latest_tx,
            kill_tx,
            shutdown,
        };

        info!(room_id = %room_id, seed, "room created");
        rooms.insert(room_id, handle.clone());
        Ok(handle)
    }

    /// Returns a room handle for the provided id, if it exists.
    pub async fn get_room(&self, room_id: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        let rooms = self.rooms.read().await;
        let mut ids: Vec<String> = rooms.keys().cloned().collect();
        ids.sort();
        ids
    }
}
