//! Player movement, possession, kicking and ball dynamics

use crate::stream::protocol::ControlInput;

use super::world::{Ball, PlayerBody, Side, WorldState};

/// Physics and rules constants
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    /// Half of the field length along x
    pub half_width: f32,
    /// Half of the field width along z
    pub half_height: f32,
    /// Half-height of each goal mouth, centered on the short edges
    pub goal_half_height: f32,
    /// Running speed at full input
    pub base_speed: f32,
    /// Speed multiplier while sprinting
    pub sprint_factor: f32,
    /// Input magnitude below which sprint is ignored
    pub sprint_deadzone: f32,
    /// Speed below which facing is kept
    pub facing_min_speed: f32,
    pub shoot_power: f32,
    pub pass_power: f32,
    /// Ball-to-player distance under which the player controls the ball
    pub control_radius: f32,
    /// Distance in front of the possessor the ball is pulled toward
    pub dribble_offset: f32,
    /// Pull strength per second toward the dribble point
    pub dribble_gain: f32,
    /// Fraction of ball velocity left after one second
    pub ball_friction: f32,
    /// Velocity kept after bouncing off an edge
    pub restitution: f32,
    /// Distance of each player from the center line at kickoff
    pub kickoff_distance: f32,
    /// Ball speed toward the conceding half at kickoff
    pub kickoff_nudge: f32,
    /// Seconds a kicker must wait before controlling the ball again. While
    /// it runs the kicker cannot possess even inside `control_radius`.
    pub kick_cooldown: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            half_width: 20.0,
            half_height: 12.0,
            goal_half_height: 4.2,
            base_speed: 7.1,
            sprint_factor: 1.35,
            sprint_deadzone: 0.05,
            facing_min_speed: 0.1,
            shoot_power: 16.0,
            pass_power: 10.0,
            control_radius: 1.05,
            dribble_offset: 0.75,
            dribble_gain: 14.0,
            ball_friction: 0.22,
            restitution: 0.8,
            kickoff_distance: 6.0,
            kickoff_nudge: 1.5,
            kick_cooldown: 0.2,
        }
    }
}

/// Physics system advancing the match by one tick
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance the world by `dt` seconds. `controls` holds the input of
    /// each seated side; an empty seat leaves its body inert.
    /// Returns the scoring side if a goal was scored, after the score
    /// was credited and the kickoff layout restored.
    pub fn step(
        world: &mut WorldState,
        controls: &[Option<ControlInput>; 2],
        dt: f32,
        cfg: &PhysicsConfig,
    ) -> Option<Side> {
        for side in Side::BOTH {
            let player = world.player_mut(side);
            player.kick_cooldown = (player.kick_cooldown - dt).max(0.0);
            match &controls[side.index()] {
                Some(input) => Self::move_player(player, input, dt, cfg),
                None => {
                    player.vel_x = 0.0;
                    player.vel_z = 0.0;
                }
            }
        }

        let seated = [controls[0].is_some(), controls[1].is_some()];
        if let Some(holder) = Self::arbitrate_possession(world, seated, cfg) {
            Self::dribble(world, holder, dt, cfg);
        }

        for side in Side::BOTH {
            if let Some(input) = &controls[side.index()] {
                Self::resolve_kick(world, side, input, cfg);
            }
        }

        let scorer = Self::integrate_ball(&mut world.ball, dt, cfg)?;
        world.score.credit(scorer);
        world.kickoff(Some(scorer.opponent()), cfg);
        Some(scorer)
    }

    /// Velocity for an input vector. The vector is normalized only when
    /// longer than 1, so partial stick deflection keeps partial speed.
    pub fn movement_velocity(input: &ControlInput, cfg: &PhysicsConfig) -> (f32, f32) {
        let (mut dir_x, mut dir_z) = (input.move_x, input.move_z);
        let magnitude = (dir_x * dir_x + dir_z * dir_z).sqrt();
        if magnitude > 1.0 {
            dir_x /= magnitude;
            dir_z /= magnitude;
        }

        let mut speed = cfg.base_speed;
        if input.sprint && magnitude > cfg.sprint_deadzone {
            speed *= cfg.sprint_factor;
        }

        (dir_x * speed, dir_z * speed)
    }

    fn move_player(player: &mut PlayerBody, input: &ControlInput, dt: f32, cfg: &PhysicsConfig) {
        let (vel_x, vel_z) = Self::movement_velocity(input, cfg);
        player.vel_x = vel_x;
        player.vel_z = vel_z;

        player.x = (player.x + vel_x * dt).clamp(-cfg.half_width, cfg.half_width);
        player.z = (player.z + vel_z * dt).clamp(-cfg.half_height, cfg.half_height);

        if (vel_x * vel_x + vel_z * vel_z).sqrt() > cfg.facing_min_speed {
            player.facing = vel_z.atan2(vel_x);
        }
    }

    /// Decide who holds the ball. On equal distance the primary side
    /// keeps it.
    fn arbitrate_possession(
        world: &mut WorldState,
        seated: [bool; 2],
        cfg: &PhysicsConfig,
    ) -> Option<Side> {
        let ball = world.ball;
        let reach = |side: Side| -> Option<f32> {
            let player = world.player(side);
            if !seated[side.index()] || player.kick_cooldown > 0.0 {
                return None;
            }
            let dist = distance(ball.x, ball.z, player.x, player.z);
            (dist < cfg.control_radius).then_some(dist)
        };

        let holder = match (reach(Side::Primary), reach(Side::Secondary)) {
            (Some(d1), Some(d2)) => {
                if d1 <= d2 {
                    Some(Side::Primary)
                } else {
                    Some(Side::Secondary)
                }
            }
            (Some(_), None) => Some(Side::Primary),
            (None, Some(_)) => Some(Side::Secondary),
            (None, None) => None,
        };

        for side in Side::BOTH {
            world.player_mut(side).possesses = holder == Some(side);
        }
        holder
    }

    /// Pull the held ball toward the point in front of its holder
    fn dribble(world: &mut WorldState, holder: Side, dt: f32, cfg: &PhysicsConfig) {
        let player = &world.players[holder.index()];
        let target_x = player.x + player.facing.cos() * cfg.dribble_offset;
        let target_z = player.z + player.facing.sin() * cfg.dribble_offset;
        let pull = (cfg.dribble_gain * dt).min(1.0);

        let ball = &mut world.ball;
        ball.x += (target_x - ball.x) * pull;
        ball.z += (target_z - ball.z) * pull;
        ball.vel_x = player.vel_x;
        ball.vel_z = player.vel_z;
    }

    /// Apply a shoot or pass request. Only the holder can kick; the
    /// request is consumed either way by the caller.
    fn resolve_kick(world: &mut WorldState, side: Side, input: &ControlInput, cfg: &PhysicsConfig) -> bool {
        if !input.shoot_requested && !input.pass_requested {
            return false;
        }

        let player = &mut world.players[side.index()];
        if !player.possesses {
            return false;
        }

        let power = if input.shoot_requested {
            cfg.shoot_power
        } else {
            cfg.pass_power
        };

        player.possesses = false;
        player.kick_cooldown = cfg.kick_cooldown;
        world.ball.vel_x = player.facing.cos() * power;
        world.ball.vel_z = player.facing.sin() * power;
        true
    }

    /// Friction, integration and edge handling. Returns the scoring side
    /// when the ball crosses a goal mouth.
    fn integrate_ball(ball: &mut Ball, dt: f32, cfg: &PhysicsConfig) -> Option<Side> {
        let decay = cfg.ball_friction.powf(dt);
        ball.vel_x *= decay;
        ball.vel_z *= decay;
        ball.x += ball.vel_x * dt;
        ball.z += ball.vel_z * dt;

        if ball.z > cfg.half_height {
            ball.z = cfg.half_height;
            ball.vel_z = -ball.vel_z.abs() * cfg.restitution;
        } else if ball.z < -cfg.half_height {
            ball.z = -cfg.half_height;
            ball.vel_z = ball.vel_z.abs() * cfg.restitution;
        }

        let in_goal_mouth = ball.z.abs() <= cfg.goal_half_height;
        if ball.x > cfg.half_width {
            if in_goal_mouth {
                return Some(Side::Primary);
            }
            ball.x = cfg.half_width;
            ball.vel_x = -ball.vel_x.abs() * cfg.restitution;
        } else if ball.x < -cfg.half_width {
            if in_goal_mouth {
                return Some(Side::Secondary);
            }
            ball.x = -cfg.half_width;
            ball.vel_x = ball.vel_x.abs() * cfg.restitution;
        }

        None
    }
}

fn distance(ax: f32, az: f32, bx: f32, bz: f32) -> f32 {
    let dx = ax - bx;
    let dz = az - bz;
    (dx * dx + dz * dz).sqrt()
}
