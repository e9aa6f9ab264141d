//! Match owner and authoritative tick loop
//!
//! One task owns the world and the session registry. Ticks, heartbeats and
//! client requests are all processed on that task, one at a time, so no
//! handler ever observes a half-applied tick.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Config;
use crate::stream::protocol::{ControlInput, Role, ServerEvent};
use crate::util::time::{
    clamp_tick_delta, unix_millis, HEARTBEAT_INTERVAL, MAX_TICK_DELTA_SECS,
    SNAPSHOT_INTERVAL_SECS, TICK_DURATION_MICROS,
};

use super::physics::{PhysicsConfig, PhysicsSystem};
use super::session::{JoinGrant, SessionRegistry};
use super::snapshot::SnapshotBuilder;
use super::world::{Side, WorldState};
use super::GameError;

/// Queued requests waiting for the game task
const COMMAND_BUFFER: usize = 256;

/// Events buffered per stream before the client counts as too slow
const STREAM_BUFFER: usize = 64;

/// Settings the game task is built from
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub access_key: Option<String>,
    pub session_ttl: Duration,
    pub match_duration_secs: f32,
    pub physics: PhysicsConfig,
}

impl GameSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access_key: config.access_key.clone(),
            session_ttl: config.session_ttl,
            match_duration_secs: config.match_duration_secs,
            physics: PhysicsConfig::default(),
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            access_key: None,
            session_ttl: Duration::from_secs(35),
            match_duration_secs: 360.0,
            physics: PhysicsConfig::default(),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, GameError>>;

/// Requests handled on the game task
#[derive(Debug)]
pub enum GameCommand {
    Join {
        name: String,
        access_key: Option<String>,
        reply: Reply<JoinGrant>,
    },
    OpenStream {
        token: String,
        reply: Reply<(Role, mpsc::Receiver<ServerEvent>)>,
    },
    SubmitInput {
        token: String,
        input: ControlInput,
        reply: Reply<()>,
    },
}

/// Cloneable handle used by request handlers to reach the game task
#[derive(Clone)]
pub struct GameHandle {
    command_tx: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    pub async fn join(
        &self,
        name: String,
        access_key: Option<String>,
    ) -> Result<JoinGrant, GameError> {
        self.request(|reply| GameCommand::Join {
            name,
            access_key,
            reply,
        })
        .await
    }

    pub async fn open_stream(
        &self,
        token: String,
    ) -> Result<(Role, mpsc::Receiver<ServerEvent>), GameError> {
        self.request(|reply| GameCommand::OpenStream { token, reply })
            .await
    }

    pub async fn submit_input(&self, token: String, input: ControlInput) -> Result<(), GameError> {
        self.request(|reply| GameCommand::SubmitInput {
            token,
            input,
            reply,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> GameCommand,
    ) -> Result<T, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable)?;
        reply_rx.await.map_err(|_| GameError::Unavailable)?
    }
}

/// The authoritative match
pub struct GameServer {
    world: WorldState,
    sessions: SessionRegistry,
    physics: PhysicsConfig,
    snapshots: SnapshotBuilder,
    session_ttl_ms: u64,
}

impl GameServer {
    pub fn new(settings: GameSettings) -> Self {
        Self {
            world: WorldState::new(settings.match_duration_secs, &settings.physics),
            sessions: SessionRegistry::new(settings.access_key),
            physics: settings.physics,
            snapshots: SnapshotBuilder::new(SNAPSHOT_INTERVAL_SECS),
            session_ttl_ms: settings.session_ttl.as_millis() as u64,
        }
    }

    /// Start the game task and return a handle to it
    pub fn spawn(settings: GameSettings) -> GameHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let server = Self::new(settings);
        tokio::spawn(server.run(command_rx));
        GameHandle { command_tx }
    }

    #[cfg(test)]
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Run ticks, heartbeats and requests until every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<GameCommand>) {
        info!(
            tick_micros = TICK_DURATION_MICROS,
            access_key_required = self.sessions.access_key_required(),
            "Game loop started"
        );

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = clamp_tick_delta(now - last_tick);
                    last_tick = now;
                    self.tick(dt, unix_millis());
                }
                _ = heartbeat.tick() => {
                    let delivered = self.sessions.broadcast(&ServerEvent::Ping);
                    debug!(delivered, "Heartbeat sent");
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, unix_millis()),
                    None => break,
                },
            }
        }

        info!("Game loop stopped");
    }

    fn handle_command(&mut self, command: GameCommand, now_ms: u64) {
        // A dropped reply receiver means the caller went away; nothing to do
        match command {
            GameCommand::Join {
                name,
                access_key,
                reply,
            } => {
                let _ = reply.send(self.join(&name, access_key.as_deref(), now_ms));
            }
            GameCommand::OpenStream { token, reply } => {
                let _ = reply.send(self.open_stream(&token, now_ms));
            }
            GameCommand::SubmitInput {
                token,
                input,
                reply,
            } => {
                let _ = reply.send(self.submit_input(&token, input, now_ms));
            }
        }
    }

    pub fn join(
        &mut self,
        name: &str,
        access_key: Option<&str>,
        now_ms: u64,
    ) -> Result<JoinGrant, GameError> {
        let grant = self.sessions.join(name, access_key, now_ms)?;
        if let Some(session) = self.sessions.get(&grant.token) {
            if let Some(side) = Side::from_role(session.role) {
                self.world.player_mut(side).name = session.display_name.clone();
            }
        }
        Ok(grant)
    }

    pub fn open_stream(
        &mut self,
        token: &str,
        now_ms: u64,
    ) -> Result<(Role, mpsc::Receiver<ServerEvent>), GameError> {
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_BUFFER);
        let role = self.sessions.attach_stream(token, stream_tx, now_ms)?;
        Ok((role, stream_rx))
    }

    pub fn submit_input(
        &mut self,
        token: &str,
        input: ControlInput,
        now_ms: u64,
    ) -> Result<(), GameError> {
        self.sessions.record_input(token, input, now_ms)
    }

    /// Advance the match by one tick
    pub fn tick(&mut self, dt: f32, now_ms: u64) {
        let dt = dt.min(MAX_TICK_DELTA_SECS);

        if self.sessions.expire_idle(now_ms, self.session_ttl_ms) {
            for side in Side::BOTH {
                if self.sessions.seat(side).is_none() {
                    self.world.player_mut(side).name.clear();
                }
            }
            self.world.kickoff(None, &self.physics);
            info!(
                seated = ?self.sessions.seated(),
                sessions = self.sessions.session_count(),
                "Controlling seat vacated, kickoff reset"
            );
        }

        let controls = self.sessions.take_controls();
        let seated = self.sessions.seated();
        self.world.advance_clock(
            dt,
            seated.iter().all(|s| *s),
            self.sessions.both_streaming(),
        );

        if let Some(scorer) = PhysicsSystem::step(&mut self.world, &controls, dt, &self.physics) {
            info!(
                side = ?scorer,
                primary = self.world.score.primary,
                secondary = self.world.score.secondary,
                "Goal scored"
            );
        }

        if self.snapshots.should_send(dt) && self.sessions.stream_count() > 0 {
            let snapshot = self.snapshots.build(&self.world, seated);
            self.sessions.broadcast(&snapshot);
        }
    }
}
