//! Snapshot cadence and building

use crate::stream::protocol::ServerEvent;

use super::world::WorldState;

/// Decides when a `state` snapshot is due, based on simulated time
pub struct SnapshotBuilder {
    /// Simulated seconds since the last snapshot
    accumulated: f32,
    /// Seconds between snapshots
    interval: f32,
}

impl SnapshotBuilder {
    pub fn new(interval: f32) -> Self {
        Self {
            accumulated: 0.0,
            interval,
        }
    }

    /// Accumulate `dt` and report whether a snapshot is due
    pub fn should_send(&mut self, dt: f32) -> bool {
        self.accumulated += dt;
        if self.accumulated >= self.interval {
            // Never carry more than one interval so a stall does not burst
            self.accumulated = (self.accumulated - self.interval).min(self.interval);
            true
        } else {
            false
        }
    }

    /// Build a snapshot message
    pub fn build(&self, world: &WorldState, active: [bool; 2]) -> ServerEvent {
        ServerEvent::State(world.snapshot(active))
    }
}
