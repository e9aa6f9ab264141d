//! Session registry: tokens, role assignment, input intake and expiry

use std::collections::HashMap;

use rand::RngCore;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::stream::protocol::{ControlInput, Population, Role, ServerEvent};
use crate::util::rate_limit::{InputRateWindow, INPUT_RATE_LIMIT};

use super::world::Side;
use super::GameError;

/// Longest display name kept, in characters
pub const MAX_NAME_CHARS: usize = 14;

/// Name used when a client joins with a blank one
pub const DEFAULT_NAME: &str = "Player";

/// Random bytes per session token (256 bits)
const TOKEN_BYTES: usize = 32;

/// Push handle attached to a session
pub type StreamSender = mpsc::Sender<ServerEvent>;

/// Credentials handed back from a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGrant {
    pub token: String,
    pub role: Role,
    pub name: String,
}

/// A joined client
#[derive(Debug)]
pub struct Session {
    pub role: Role,
    pub display_name: String,
    pub pending_input: ControlInput,
    pub last_seen_ms: u64,
    pub rate_window: InputRateWindow,
    pub stream: Option<StreamSender>,
}

impl Session {
    fn new(role: Role, display_name: String, now_ms: u64) -> Self {
        Self {
            role,
            display_name,
            pending_input: ControlInput::default(),
            last_seen_ms: now_ms,
            rate_window: InputRateWindow::default(),
            stream: None,
        }
    }

    pub fn has_live_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.is_closed())
    }
}

/// Owns every session and the two controlling seats
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    /// Token holding each controlling seat, indexed by `Side::index`
    seats: [Option<String>; 2],
    access_key: Option<String>,
}

impl SessionRegistry {
    pub fn new(access_key: Option<String>) -> Self {
        Self {
            sessions: HashMap::new(),
            seats: [None, None],
            access_key,
        }
    }

    pub fn access_key_required(&self) -> bool {
        self.access_key.is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn get(&self, token: &str) -> Option<&Session> {
        self.sessions.get(token)
    }

    /// Token currently holding `side`
    pub fn seat(&self, side: Side) -> Option<&str> {
        self.seats[side.index()].as_deref()
    }

    /// Which seats are held by a live session
    pub fn seated(&self) -> [bool; 2] {
        [self.seats[0].is_some(), self.seats[1].is_some()]
    }

    /// True while both seated sessions have a live stream
    pub fn both_streaming(&self) -> bool {
        self.seats.iter().all(|seat| {
            seat.as_ref()
                .and_then(|token| self.sessions.get(token))
                .is_some_and(Session::has_live_stream)
        })
    }

    /// Register a new client. The first free controlling seat is taken,
    /// otherwise the client becomes an observer.
    pub fn join(
        &mut self,
        name: &str,
        access_key: Option<&str>,
        now_ms: u64,
    ) -> Result<JoinGrant, GameError> {
        if let Some(expected) = &self.access_key {
            if access_key != Some(expected.as_str()) {
                return Err(GameError::Forbidden);
            }
        }

        let display_name = sanitize_name(name);
        let token = self.fresh_token();

        let role = match Side::BOTH.into_iter().find(|side| self.seats[side.index()].is_none()) {
            Some(side) => {
                self.seats[side.index()] = Some(token.clone());
                side.role()
            }
            None => Role::Observer,
        };

        self.sessions
            .insert(token.clone(), Session::new(role, display_name.clone(), now_ms));

        info!(
            token = %short(&token),
            role = ?role,
            name = %display_name,
            sessions = self.sessions.len(),
            "Session joined"
        );

        Ok(JoinGrant {
            token,
            role,
            name: display_name,
        })
    }

    /// Bind a push handle, replacing (and thereby closing) any previous
    /// one, then send the welcome event on it.
    pub fn attach_stream(
        &mut self,
        token: &str,
        stream: StreamSender,
        now_ms: u64,
    ) -> Result<Role, GameError> {
        let population = self.population();
        let access_key_required = self.access_key_required();

        let session = self
            .sessions
            .get_mut(token)
            .ok_or(GameError::Unauthenticated)?;
        session.last_seen_ms = now_ms;

        let welcome = ServerEvent::Welcome {
            role: session.role,
            population,
            access_key_required,
        };
        if stream.try_send(welcome).is_err() {
            debug!(token = %short(token), "Welcome could not be delivered");
        }

        if session.stream.replace(stream).is_some() {
            debug!(token = %short(token), "Replaced previous stream");
        }

        info!(token = %short(token), role = ?session.role, "Stream attached");
        Ok(session.role)
    }

    /// Store a control vector for the next tick
    pub fn record_input(
        &mut self,
        token: &str,
        input: ControlInput,
        now_ms: u64,
    ) -> Result<(), GameError> {
        let session = self
            .sessions
            .get_mut(token)
            .ok_or(GameError::Unauthenticated)?;
        session.last_seen_ms = now_ms;

        // Observers can't control
        if !session.role.is_controlling() {
            return Ok(());
        }

        if !session.rate_window.try_acquire(now_ms, INPUT_RATE_LIMIT) {
            return Err(GameError::RateLimited);
        }

        session.pending_input = input.sanitized();
        Ok(())
    }

    /// Drop every session idle for longer than `ttl_ms`. Returns true when
    /// a controlling seat was vacated.
    pub fn expire_idle(&mut self, now_ms: u64, ttl_ms: u64) -> bool {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| now_ms.saturating_sub(s.last_seen_ms) > ttl_ms)
            .map(|(token, _)| token.clone())
            .collect();

        let mut vacated = false;
        for token in expired {
            // Dropping the session drops its stream sender, closing the stream
            if let Some(session) = self.sessions.remove(&token) {
                info!(
                    token = %short(&token),
                    role = ?session.role,
                    name = %session.display_name,
                    "Session expired"
                );
            }
            for seat in self.seats.iter_mut() {
                if seat.as_deref() == Some(token.as_str()) {
                    *seat = None;
                    vacated = true;
                }
            }
        }
        vacated
    }

    /// Copy each seated side's pending input for this tick and clear its
    /// one-shot kick requests.
    pub fn take_controls(&mut self) -> [Option<ControlInput>; 2] {
        let mut controls = [None, None];
        for side in Side::BOTH {
            let Some(token) = &self.seats[side.index()] else {
                continue;
            };
            if let Some(session) = self.sessions.get_mut(token) {
                controls[side.index()] = Some(session.pending_input);
                session.pending_input.shoot_requested = false;
                session.pending_input.pass_requested = false;
            }
        }
        controls
    }

    /// Number of attached, still-open streams
    pub fn stream_count(&self) -> usize {
        self.sessions.values().filter(|s| s.has_live_stream()).count()
    }

    /// Best-effort fan-out. A handle that is closed or cannot keep up is
    /// dropped; the session itself stays until it idles out.
    pub fn broadcast(&mut self, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for (token, session) in self.sessions.iter_mut() {
            let Some(stream) = &session.stream else {
                continue;
            };
            match stream.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(token = %short(token), error = %e, "Dropping stream");
                    session.stream = None;
                }
            }
        }
        delivered
    }

    pub fn population(&self) -> Population {
        let mut population = Population {
            total: self.sessions.len(),
            ..Default::default()
        };
        for session in self.sessions.values() {
            match session.role {
                Role::Primary => population.primary += 1,
                Role::Secondary => population.secondary += 1,
                Role::Observer => population.observers += 1,
            }
        }
        population
    }

    fn fresh_token(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; TOKEN_BYTES];
            rng.fill_bytes(&mut bytes);
            let token = hex::encode(bytes);
            if !self.sessions.contains_key(&token) {
                return token;
            }
        }
    }
}

/// Trim and cap a requested display name
pub fn sanitize_name(name: &str) -> String {
    let trimmed: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    let trimmed = trimmed.trim_end();

    if trimmed.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Token prefix safe to put in logs
fn short(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    const TTL: u64 = 35_000;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(None)
    }

    fn moving(move_x: f32) -> ControlInput {
        ControlInput {
            move_x,
            ..Default::default()
        }
    }

    #[test]
    fn roles_assigned_by_scarcity() {
        let mut reg = registry();
        let a = reg.join("ana", None, 0).unwrap();
        let b = reg.join("bo", None, 0).unwrap();
        let c = reg.join("cy", None, 0).unwrap();

        assert_eq!(a.role, Role::Primary);
        assert_eq!(b.role, Role::Secondary);
        assert_eq!(c.role, Role::Observer);
        assert_eq!(reg.seat(Side::Primary), Some(a.token.as_str()));
        assert_eq!(
            reg.population(),
            Population {
                primary: 1,
                secondary: 1,
                observers: 1,
                total: 3
            }
        );
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();
        let b = reg.join("b", None, 0).unwrap();
        assert_eq!(a.token.len(), TOKEN_BYTES * 2);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn access_key_is_enforced() {
        let mut reg = SessionRegistry::new(Some("sesame".to_string()));
        assert!(reg.access_key_required());
        assert!(matches!(reg.join("a", None, 0), Err(GameError::Forbidden)));
        assert!(matches!(reg.join("a", Some("nope"), 0), Err(GameError::Forbidden)));
        assert_ok!(reg.join("a", Some("sesame"), 0));
        assert_eq!(reg.session_count(), 1);
    }

    #[test]
    fn names_are_trimmed_and_capped() {
        assert_eq!(sanitize_name("  ana  "), "ana");
        assert_eq!(sanitize_name(""), DEFAULT_NAME);
        assert_eq!(sanitize_name("abcdefghijklmnopqrstuvwxyz").chars().count(), MAX_NAME_CHARS);
        assert_eq!(sanitize_name("a\nb"), "ab");
    }

    #[test]
    fn unknown_token_is_rejected() {
        let mut reg = registry();
        assert!(matches!(
            reg.record_input("missing", moving(1.0), 0),
            Err(GameError::Unauthenticated)
        ));
        let (tx, _rx) = mpsc::channel(4);
        assert!(matches!(
            reg.attach_stream("missing", tx, 0),
            Err(GameError::Unauthenticated)
        ));
    }

    #[test]
    fn observer_input_is_accepted_but_ignored() {
        let mut reg = registry();
        reg.join("a", None, 0).unwrap();
        reg.join("b", None, 0).unwrap();
        let watcher = reg.join("c", None, 0).unwrap();

        for i in 0..40 {
            assert_ok!(reg.record_input(&watcher.token, moving(1.0), 5_000 + i));
        }
        let session = reg.get(&watcher.token).unwrap();
        assert_eq!(session.pending_input, ControlInput::default());
        assert_eq!(session.last_seen_ms, 5_039);
    }

    #[test]
    fn input_is_clamped_and_last_write_wins() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();
        assert_ok!(reg.record_input(&a.token, moving(0.2), 10));
        assert_ok!(reg.record_input(&a.token, moving(5.0), 20));
        assert_eq!(reg.get(&a.token).unwrap().pending_input.move_x, 1.0);
    }

    #[test]
    fn thirty_first_input_in_a_second_is_rejected() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();
        for i in 0..INPUT_RATE_LIMIT {
            assert_ok!(reg.record_input(&a.token, moving(0.5), 3_000 + i as u64));
        }

        let rejected = reg.record_input(&a.token, moving(-1.0), 3_500);
        assert!(matches!(rejected, Err(GameError::RateLimited)));
        assert_eq!(reg.get(&a.token).unwrap().pending_input.move_x, 0.5);

        assert_ok!(reg.record_input(&a.token, moving(-1.0), 4_000));
        assert_eq!(reg.get(&a.token).unwrap().pending_input.move_x, -1.0);
    }

    #[test]
    fn kick_flags_cleared_after_one_tick() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();
        let kick = ControlInput {
            move_x: 1.0,
            shoot_requested: true,
            pass_requested: true,
            ..Default::default()
        };
        assert_ok!(reg.record_input(&a.token, kick, 0));

        let first = reg.take_controls();
        assert_eq!(first[0], Some(kick));
        assert_eq!(first[1], None);

        let second = reg.take_controls()[0].unwrap();
        assert!(!second.shoot_requested && !second.pass_requested);
        assert_eq!(second.move_x, 1.0);
    }

    #[test]
    fn expiry_frees_controlling_seat() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();
        let b = reg.join("b", None, 0).unwrap();
        assert_ok!(reg.record_input(&b.token, moving(0.0), 30_000));

        assert!(!reg.expire_idle(TTL, TTL));
        assert!(reg.expire_idle(TTL + 1, TTL));
        assert!(reg.get(&a.token).is_none());
        assert_eq!(reg.seated(), [false, true]);

        let c = reg.join("c", None, TTL + 2).unwrap();
        assert_eq!(c.role, Role::Primary);
    }

    #[test]
    fn observer_expiry_does_not_vacate_seat() {
        let mut reg = registry();
        reg.join("a", None, 100_000).unwrap();
        reg.join("b", None, 100_000).unwrap();
        reg.join("c", None, 0).unwrap();

        assert!(!reg.expire_idle(100_000, TTL));
        assert_eq!(reg.session_count(), 2);
    }

    #[test]
    fn attach_sends_welcome_and_replaces_stream() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();

        let (old_tx, mut old_rx) = mpsc::channel(4);
        assert_eq!(reg.attach_stream(&a.token, old_tx, 1).unwrap(), Role::Primary);
        match old_rx.try_recv().unwrap() {
            ServerEvent::Welcome {
                role,
                population,
                access_key_required,
            } => {
                assert_eq!(role, Role::Primary);
                assert_eq!(population.total, 1);
                assert!(!access_key_required);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let (new_tx, mut new_rx) = mpsc::channel(4);
        assert_ok!(reg.attach_stream(&a.token, new_tx, 2));
        assert!(matches!(new_rx.try_recv(), Ok(ServerEvent::Welcome { .. })));
        // Old sender was dropped with the replaced handle
        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn broadcast_drops_closed_streams() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();
        let b = reg.join("b", None, 0).unwrap();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, rx_b) = mpsc::channel(8);
        reg.attach_stream(&a.token, tx_a, 0).unwrap();
        reg.attach_stream(&b.token, tx_b, 0).unwrap();
        assert!(reg.both_streaming());

        drop(rx_b);
        assert!(!reg.both_streaming());

        assert_eq!(reg.broadcast(&ServerEvent::Ping), 1);
        assert!(reg.get(&b.token).unwrap().stream.is_none());
        assert!(reg.get(&b.token).is_some());

        assert!(matches!(rx_a.try_recv(), Ok(ServerEvent::Welcome { .. })));
        assert!(matches!(rx_a.try_recv(), Ok(ServerEvent::Ping)));
    }

    #[test]
    fn broadcast_drops_streams_that_fall_behind() {
        let mut reg = registry();
        let a = reg.join("a", None, 0).unwrap();

        // The welcome takes the only slot and nobody reads it
        let (tx, _rx) = mpsc::channel(1);
        reg.attach_stream(&a.token, tx, 0).unwrap();
        assert_eq!(reg.stream_count(), 1);

        assert_eq!(reg.broadcast(&ServerEvent::Ping), 0);
        assert!(reg.get(&a.token).unwrap().stream.is_none());
        assert_eq!(reg.stream_count(), 0);

        // Nothing left to fill; the session outlives its stream
        assert_eq!(reg.broadcast(&ServerEvent::Ping), 0);
        assert!(reg.get(&a.token).is_some());
        assert_ok!(reg.record_input(&a.token, moving(1.0), 10));
    }
}
