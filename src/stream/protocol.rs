//! Push protocol and request payload definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

/// Seat a session holds in the shared match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Controls the left-side player, attacks the right goal
    Primary,
    /// Controls the right-side player, attacks the left goal
    Secondary,
    /// Watches the stream, input has no effect
    Observer,
}

impl Role {
    pub fn is_controlling(self) -> bool {
        !matches!(self, Role::Observer)
    }
}

/// Control vector submitted by a client
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlInput {
    #[serde(alias = "moveX")]
    pub move_x: f32,
    #[serde(alias = "moveZ")]
    pub move_z: f32,
    pub sprint: bool,
    #[serde(alias = "shootRequested", alias = "shoot")]
    pub shoot_requested: bool,
    #[serde(alias = "passRequested", alias = "pass")]
    pub pass_requested: bool,
}

impl ControlInput {
    /// Clamp both axes into [-1, 1]; non-finite axes become 0
    pub fn sanitized(self) -> Self {
        fn axis(v: f32) -> f32 {
            if v.is_finite() {
                v.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        }

        Self {
            move_x: axis(self.move_x),
            move_z: axis(self.move_z),
            ..self
        }
    }
}

/// Number of sessions per role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    pub primary: usize,
    pub secondary: usize,
    pub observers: usize,
    pub total: usize,
}

/// Messages pushed from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once when a stream is attached
    Welcome {
        role: Role,
        population: Population,
        access_key_required: bool,
    },

    /// Transport keep-alive
    Ping,

    /// Public match snapshot (sent at regular intervals)
    State(StateSnapshot),
}

impl ServerEvent {
    /// Event name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::Ping => "ping",
            ServerEvent::State(_) => "state",
        }
    }
}

/// Snapshot of the shared match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Simulated seconds played
    pub clock: f32,
    /// Seconds left in the match
    pub remaining: f32,
    pub score: ScoreSnapshot,
    pub players: Vec<PlayerSnapshot>,
    pub ball: BallSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub primary: u32,
    pub secondary: u32,
}

/// Player body state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub role: Role,
    pub name: String,
    /// Whether a live session holds this seat
    pub active: bool,
    pub x: f32,
    pub z: f32,
    /// Facing angle in radians, measured from +x toward +z
    pub facing: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub z: f32,
}
