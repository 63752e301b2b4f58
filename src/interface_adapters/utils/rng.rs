use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

/// Returns a process-unique identifier for correlating connection logs.
///
/// The counter starts at a random offset so ids from different runs rarely overlap in
/// aggregated logs.
pub fn conn_id() -> u64 {
    static COUNTER: OnceLock<AtomicU64> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| AtomicU64::new(rand::random::<u32>() as u64));
    counter.fetch_add(1, Ordering::Relaxed)
}
