use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

/// Values the server reads once at boot.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ledger_service_url: String,
    pub ledger_timeout: Duration,
    /// Rooms created at boot; the first one is the default for sockets without `room_id`.
    pub room_ids: Vec<String>,
    pub room_seed: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            ledger_service_url: ledger_service_url(),
            ledger_timeout: ledger_timeout(),
            room_ids: room_ids(),
            room_seed: room_seed(),
        }
    }
}

pub fn http_port() -> u16 {
    env::var("GAME_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

pub fn ledger_service_url() -> String {
    env::var("LEDGER_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:3003".to_string())
}

pub fn ledger_timeout() -> Duration {
    let millis = env::var("LEDGER_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

pub fn room_ids() -> Vec<String> {
    parse_room_ids(env::var("ROOM_IDS").ok().as_deref())
}

/// Base seed for room RNGs; random when unset so rooms differ between runs.
pub fn room_seed() -> u64 {
    env::var("ROOM_SEED")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_else(rand::random)
}

fn parse_room_ids(raw: Option<&str>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.unwrap_or("").split(',').map(str::trim) {
        if !id.is_empty() && !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    if ids.is_empty() {
        ids.push(DEFAULT_ROOM_ID.to_string());
    }
    ids
}

pub const DEFAULT_ROOM_ID: &str = "main";

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const UPDATE_BROADCAST_CAPACITY: usize = 64;

// 20 Hz; gameplay rates in `domain::tuning` assume this period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
