use std::{env, time::Duration};

// Runtime/server settings read from the environment (not gameplay tuning).

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn http_port() -> u16 {
    env_or("ARENA_SERVER_PORT", 3001)
}

pub fn tick_interval() -> Duration {
    // A zero interval would make tokio's interval panic.
    Duration::from_millis(env_or("TICK_INTERVAL_MS", 100u64).max(1))
}

pub fn board_size() -> (i32, i32) {
    let width = env_or("BOARD_WIDTH", 30i32).max(MIN_BOARD_SIDE);
    let height = env_or("BOARD_HEIGHT", 30i32).max(MIN_BOARD_SIDE);
    (width, height)
}

pub fn pending_match_timeout() -> Duration {
    Duration::from_secs(env_or("PENDING_MATCH_TIMEOUT_SECS", 600))
}

pub fn reaper_interval() -> Duration {
    Duration::from_secs(env_or("REAPER_INTERVAL_SECS", 30u64).max(1))
}

const MIN_BOARD_SIDE: i32 = 5;

pub const SNAPSHOT_BROADCAST_CAPACITY: usize = 64;
pub const NOTICE_BROADCAST_CAPACITY: usize = 32;
pub const SCORE_CHANNEL_CAPACITY: usize = 1024;
