//! Authoritative match state: clock, score, player bodies and ball

use crate::stream::protocol::{
    BallSnapshot, PlayerSnapshot, Role, ScoreSnapshot, StateSnapshot,
};

use super::physics::PhysicsConfig;

/// One of the two controllable sides of the pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Starts on the negative-x half
    Primary,
    /// Starts on the positive-x half
    Secondary,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Primary, Side::Secondary];

    pub fn index(self) -> usize {
        match self {
            Side::Primary => 0,
            Side::Secondary => 1,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Primary => Side::Secondary,
            Side::Secondary => Side::Primary,
        }
    }

    /// Sign of the x coordinate of this side's own half
    pub fn home_sign(self) -> f32 {
        match self {
            Side::Primary => -1.0,
            Side::Secondary => 1.0,
        }
    }

    pub fn role(self) -> Role {
        match self {
            Side::Primary => Role::Primary,
            Side::Secondary => Role::Secondary,
        }
    }

    pub fn from_role(role: Role) -> Option<Side> {
        match role {
            Role::Primary => Some(Side::Primary),
            Role::Secondary => Some(Side::Secondary),
            Role::Observer => None,
        }
    }
}

/// Player body (authoritative)
#[derive(Debug, Clone, Default)]
pub struct PlayerBody {
    pub name: String,
    pub x: f32,
    pub z: f32,
    pub vel_x: f32,
    pub vel_z: f32,
    /// Heading in radians, `atan2(z, x)` convention
    pub facing: f32,
    pub possesses: bool,
    /// Seconds before this player may take possession again after a kick
    pub kick_cooldown: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ball {
    pub x: f32,
    pub z: f32,
    pub vel_x: f32,
    pub vel_z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub primary: u32,
    pub secondary: u32,
}

impl Score {
    pub fn credit(&mut self, side: Side) {
        match side {
            Side::Primary => self.primary += 1,
            Side::Secondary => self.secondary += 1,
        }
    }
}

/// The single shared match
#[derive(Debug, Clone)]
pub struct WorldState {
    pub match_clock: f32,
    pub match_remaining: f32,
    pub score: Score,
    pub players: [PlayerBody; 2],
    pub ball: Ball,
}

impl WorldState {
    pub fn new(match_duration_secs: f32, cfg: &PhysicsConfig) -> Self {
        let mut world = Self {
            match_clock: 0.0,
            match_remaining: match_duration_secs.max(0.0),
            score: Score::default(),
            players: [PlayerBody::default(), PlayerBody::default()],
            ball: Ball::default(),
        };
        world.kickoff(None, cfg);
        world
    }

    pub fn player(&self, side: Side) -> &PlayerBody {
        &self.players[side.index()]
    }

    pub fn player_mut(&mut self, side: Side) -> &mut PlayerBody {
        &mut self.players[side.index()]
    }

    /// Restore the kickoff layout. The ball drifts toward the half of
    /// `conceded`, or stays still when no side is favoured.
    pub fn kickoff(&mut self, conceded: Option<Side>, cfg: &PhysicsConfig) {
        for side in Side::BOTH {
            let player = self.player_mut(side);
            player.x = side.home_sign() * cfg.kickoff_distance;
            player.z = 0.0;
            player.vel_x = 0.0;
            player.vel_z = 0.0;
            // Face the opposite half
            player.facing = match side {
                Side::Primary => 0.0,
                Side::Secondary => std::f32::consts::PI,
            };
            player.possesses = false;
            player.kick_cooldown = 0.0;
        }

        self.ball = Ball {
            x: 0.0,
            z: 0.0,
            vel_x: conceded.map_or(0.0, |side| side.home_sign() * cfg.kickoff_nudge),
            vel_z: 0.0,
        };
    }

    /// Advance the match clocks. `seated` is true while both controlling
    /// seats are held, `streaming` while both of them also have a stream.
    pub fn advance_clock(&mut self, dt: f32, seated: bool, streaming: bool) {
        if seated {
            self.match_clock += dt;
        }
        if streaming {
            self.match_remaining = (self.match_remaining - dt).max(0.0);
        }
    }

    /// Build the public snapshot; `active` marks which seats are held
    pub fn snapshot(&self, active: [bool; 2]) -> StateSnapshot {
        let players = Side::BOTH
            .iter()
            .map(|&side| {
                let p = self.player(side);
                PlayerSnapshot {
                    role: side.role(),
                    name: p.name.clone(),
                    active: active[side.index()],
                    x: p.x,
                    z: p.z,
                    facing: p.facing,
                }
            })
            .collect();

        StateSnapshot {
            clock: self.match_clock,
            remaining: self.match_remaining,
            score: ScoreSnapshot {
                primary: self.score.primary,
                secondary: self.score.secondary,
            },
            players,
            ball: BallSnapshot {
                x: self.ball.x,
                z: self.ball.z,
            },
        }
    }
}
