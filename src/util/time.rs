//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 ticks per second
pub const SNAPSHOT_TPS: u32 = 20; // 20 snapshots per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Simulated seconds between two `state` snapshots
pub const SNAPSHOT_INTERVAL_SECS: f32 = 1.0 / SNAPSHOT_TPS as f32;

/// Upper bound on a single integration step; longer stalls are truncated
pub const MAX_TICK_DELTA_SECS: f32 = 0.05;

/// Keep-alive interval for push streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Clamp a measured wall-clock delta to a usable timestep (in seconds)
pub fn clamp_tick_delta(elapsed: Duration) -> f32 {
    elapsed.as_secs_f32().min(MAX_TICK_DELTA_SECS)
}

/// Which wall-clock second a millisecond timestamp falls in
pub fn unix_second(millis: u64) -> u64 {
    millis / 1000
}
