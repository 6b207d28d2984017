//! The session gateway: turns inbound actions and timer signals into
//! session mutations and outbound events.
//!
//! Everything here is synchronous. The actor in `actor.rs` owns the one
//! [`SessionGateway`] and feeds it from a single loop, so each call runs to
//! completion before the next begins. Within a call the order is always:
//!
//! 1. mutate the session (roster, phase machine);
//! 2. apply the resulting timer commands (stop before start);
//! 3. deliver the events describing the new state.

use std::collections::HashMap;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use spyline_game::{Departure, DepartureEffect, PhaseMachine, apply_all};
use spyline_protocol::{
    ClientAction, ConnectionId, EndReason, ImpostorMode, Phase, ServerEvent, SessionId,
    SessionView,
};
use spyline_session::{MergeOutcome, Session, SessionError, SessionStore};
use spyline_timer::{TimerEvent, TimerKind, TimerScheduler, TimerSignal};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::ServerConfig;

/// Where a connection's outbound events go.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Events produced by one call, delivered once the call's mutation is done.
#[derive(Debug, Default)]
struct Outgoing(Vec<(ConnectionId, ServerEvent)>);

impl Outgoing {
    fn to(&mut self, conn: ConnectionId, event: ServerEvent) {
        self.0.push((conn, event));
    }

    /// Fans `event` out to every player in `session`.
    fn session(&mut self, session: &Session, event: ServerEvent) {
        for player in session.players() {
            self.0.push((player.connection_id, event.clone()));
        }
    }
}

/// Owns all session state and every outbound channel.
pub struct SessionGateway {
    store: SessionStore,
    machine: PhaseMachine,
    timers: TimerScheduler,
    rng: StdRng,
    outboxes: HashMap<ConnectionId, Outbox>,
}

impl SessionGateway {
    /// Builds a gateway and the receiver its countdowns report to. The
    /// caller must route every [`TimerEvent`] back into
    /// [`on_timer`](Self::on_timer).
    pub fn new(config: &ServerConfig) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (timers, timer_events) = TimerScheduler::new(config.timer.clone());
        let gateway = Self {
            store: SessionStore::new(config.session.clone()),
            machine: PhaseMachine::new(config.rules.clone()),
            timers,
            rng,
            outboxes: HashMap::new(),
        };
        (gateway, timer_events)
    }

    // -- Connections ---------------------------------------------------------

    /// Registers where `conn`'s events should be sent.
    pub fn attach(&mut self, conn: ConnectionId, outbox: Outbox) {
        trace!(conn_id = %conn, "connection attached");
        self.outboxes.insert(conn, outbox);
    }

    pub fn is_attached(&self, conn: ConnectionId) -> bool {
        self.outboxes.contains_key(&conn)
    }

    /// Removes `conn` from every session it belonged to and forgets its
    /// outbox. Returns the new state of each session that still exists.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<(SessionId, SessionView)> {
        self.outboxes.remove(&conn);

        let mut affected = Vec::new();
        for id in self.store.sessions_with(conn) {
            let Some(session) = self.store.get_mut(id) else {
                continue;
            };
            let departure = match self.machine.depart(session, conn, &mut self.rng) {
                Ok(departure) => departure,
                Err(err) => {
                    debug!(session_id = %id, conn_id = %conn, error = %err, "departure skipped");
                    continue;
                }
            };
            let (out, view) = self.settle_departure(id, departure);
            self.deliver(out);
            if let Some(view) = view {
                affected.push((id, view));
            }
        }

        debug!(conn_id = %conn, sessions = affected.len(), "connection disconnected");
        affected
    }

    // -- Actions -------------------------------------------------------------

    /// Applies one inbound action from `conn`.
    ///
    /// A refused action produces an `actionError` for `conn` alone and
    /// leaves every session untouched.
    pub fn handle_action(&mut self, conn: ConnectionId, action: ClientAction) {
        let result = match action {
            ClientAction::CreateSession { host_name } => Ok(self.create(conn, host_name)),
            ClientAction::JoinSession { session_id, player_name } => {
                self.join(conn, session_id, player_name)
            }
            ClientAction::ReconnectSession { session_id, player_name } => {
                self.reconnect(conn, session_id, player_name)
            }
            ClientAction::StartGame { session_id, words, mode } => {
                self.start(conn, session_id, &words, mode)
            }
            ClientAction::Ready { session_id } => self.ready(conn, session_id),
            ClientAction::EndTurn { session_id } => self.end_turn(conn, session_id),
            ClientAction::RequestEnd { session_id } => self.request_end(conn, session_id),
            ClientAction::LeaveSession { session_id } => self.leave(conn, session_id),
        };

        match result {
            Ok(out) => self.deliver(out),
            Err(err) => {
                debug!(conn_id = %conn, reason = ?err.reason(), error = %err, "action rejected");
                self.send(
                    conn,
                    ServerEvent::ActionError {
                        reason: err.reason(),
                        message: err.to_string(),
                    },
                );
            }
        }
    }

    fn create(&mut self, conn: ConnectionId, host_name: String) -> Outgoing {
        let (session_id, session) = self.store.create(conn, host_name);
        let mut out = Outgoing::default();
        out.to(
            conn,
            ServerEvent::SessionCreated {
                session_id,
                session: session.view(),
            },
        );
        out
    }

    fn join(
        &mut self,
        conn: ConnectionId,
        id: SessionId,
        name: String,
    ) -> Result<Outgoing, SessionError> {
        let session = lookup(&mut self.store, id)?;
        let outcome = session.join(conn, name)?;
        debug!(session_id = %id, conn_id = %conn, ?outcome, players = session.player_count(), "player joined");

        let mut out = Outgoing::default();
        out.session(session, roster_changed(session));
        Ok(out)
    }

    fn reconnect(
        &mut self,
        conn: ConnectionId,
        id: SessionId,
        name: String,
    ) -> Result<Outgoing, SessionError> {
        let session = lookup(&mut self.store, id)?;
        match session.merge_by_name(conn, &name) {
            MergeOutcome::Merged { previous } => {
                info!(session_id = %id, conn_id = %conn, %previous, "player reconnected");
            }
            MergeOutcome::AlreadyMember => {}
            MergeOutcome::NoMatch => {
                session.join(conn, name)?;
            }
        }

        let mut out = Outgoing::default();
        out.session(session, roster_changed(session));
        if let Some(event) = session.game_started_for(conn) {
            out.to(conn, event);
        }
        if session.phase() == Phase::Playing {
            out.to(conn, turn_changed(session));
        }
        Ok(out)
    }

    fn start(
        &mut self,
        conn: ConnectionId,
        id: SessionId,
        words: &[String],
        mode: ImpostorMode,
    ) -> Result<Outgoing, SessionError> {
        let session = lookup(&mut self.store, id)?;
        let timers = self.machine.start(session, conn, words, mode, &mut self.rng)?;
        apply_all(&timers, &mut self.timers, id);

        let mut out = Outgoing::default();
        for player in session.players() {
            if let Some(event) = session.game_started_for(player.connection_id) {
                out.to(player.connection_id, event);
            }
        }
        Ok(out)
    }

    fn ready(&mut self, conn: ConnectionId, id: SessionId) -> Result<Outgoing, SessionError> {
        let session = lookup(&mut self.store, id)?;
        let mut out = Outgoing::default();
        if let Some(timers) = self.machine.ready(session, conn)? {
            apply_all(&timers, &mut self.timers, id);
            out.session(session, phase_changed(session));
        }
        Ok(out)
    }

    fn end_turn(&mut self, conn: ConnectionId, id: SessionId) -> Result<Outgoing, SessionError> {
        let session = lookup(&mut self.store, id)?;
        let mut out = Outgoing::default();
        if let Some(timers) = self.machine.end_turn(session, conn)? {
            apply_all(&timers, &mut self.timers, id);
            out.session(session, turn_changed(session));
        }
        Ok(out)
    }

    fn request_end(&mut self, conn: ConnectionId, id: SessionId) -> Result<Outgoing, SessionError> {
        let session = lookup(&mut self.store, id)?;
        let mut out = Outgoing::default();
        if let Some(timers) = self.machine.request_end(session, conn)? {
            apply_all(&timers, &mut self.timers, id);
            out.session(session, ServerEvent::SessionEnded { reason: EndReason::Requested });
            out.session(session, roster_changed(session));
        }
        Ok(out)
    }

    fn leave(&mut self, conn: ConnectionId, id: SessionId) -> Result<Outgoing, SessionError> {
        let session = lookup(&mut self.store, id)?;
        let departure = self.machine.depart(session, conn, &mut self.rng)?;
        let (mut out, _) = self.settle_departure(id, departure);
        out.to(conn, ServerEvent::LeftSession { session_id: id });
        Ok(out)
    }

    /// Applies a departure's timer work, deletes the session if it emptied,
    /// and reports the new state to whoever remains.
    fn settle_departure(
        &mut self,
        id: SessionId,
        departure: Departure,
    ) -> (Outgoing, Option<SessionView>) {
        apply_all(&departure.timers, &mut self.timers, id);
        let mut out = Outgoing::default();
        info!(
            session_id = %id,
            conn_id = %departure.removal.player.connection_id,
            remaining = departure.removal.remaining,
            effect = ?departure.effect,
            "player left"
        );

        if departure.effect == DepartureEffect::SessionEmptied {
            self.timers.cancel_all(id);
            self.store.delete(id);
            return (out, None);
        }
        let Some(session) = self.store.get(id) else {
            return (out, None);
        };

        match departure.effect {
            DepartureEffect::RoundAborted => {
                out.session(session, ServerEvent::SessionEnded { reason: EndReason::NotEnoughPlayers });
                out.session(session, roster_changed(session));
            }
            DepartureEffect::TurnPassed { .. } => {
                out.session(session, roster_changed(session));
                out.session(session, turn_changed(session));
            }
            DepartureEffect::ImpostorRerolled { impostor } => {
                out.session(session, roster_changed(session));
                if let Some(event) = session.game_started_for(impostor) {
                    out.to(impostor, event);
                }
            }
            DepartureEffect::RosterOnly | DepartureEffect::SessionEmptied => {
                out.session(session, roster_changed(session));
            }
        }
        (out, Some(session.view()))
    }

    // -- Timers ----------------------------------------------------------------

    /// Applies one countdown signal. Stale signals, and signals for sessions
    /// that no longer exist, are dropped without effect.
    pub fn on_timer(&mut self, event: TimerEvent) {
        if !self.timers.accept(&event) {
            return;
        }
        let id = event.key.session;
        let Some(session) = self.store.get_mut(id) else {
            trace!(session_id = %id, "timer signal for a deleted session");
            self.timers.cancel_all(id);
            return;
        };

        let mut out = Outgoing::default();
        match (event.key.kind, event.signal) {
            (TimerKind::PreGame, TimerSignal::Tick { remaining }) if session.phase() == Phase::PreGame => {
                session.set_pre_game_seconds_left(remaining);
                out.session(session, timer_tick(session));
            }
            (TimerKind::Turn, TimerSignal::Tick { remaining }) if session.phase() == Phase::Playing => {
                session.set_turn_seconds_left(remaining);
                out.session(session, timer_tick(session));
            }
            (TimerKind::PreGame, TimerSignal::Expired) => {
                if let Some(timers) = self.machine.begin_play(session) {
                    apply_all(&timers, &mut self.timers, id);
                    out.session(session, phase_changed(session));
                }
            }
            (TimerKind::Turn, TimerSignal::Expired) => {
                if let Some(timers) = self.machine.rotate(session) {
                    apply_all(&timers, &mut self.timers, id);
                    out.session(session, turn_changed(session));
                }
            }
            (kind, signal) => {
                trace!(session_id = %id, %kind, ?signal, phase = %session.phase(), "timer signal outside its phase");
            }
        }
        self.deliver(out);
    }

    // -- Reclamation -----------------------------------------------------------

    /// Deletes lobbies that never started and have outlived the idle
    /// retention, telling their players. Returns how many were deleted.
    pub fn sweep(&mut self) -> usize {
        let reclaimed = self.store.reclaim_stale();
        self.end_reclaimed(reclaimed)
    }

    /// Like [`sweep`](Self::sweep), measured at `now`.
    pub fn sweep_at(&mut self, now: Instant) -> usize {
        let reclaimed = self.store.reclaim_stale_at(now);
        self.end_reclaimed(reclaimed)
    }

    fn end_reclaimed(&mut self, reclaimed: Vec<Session>) -> usize {
        let mut out = Outgoing::default();
        for session in &reclaimed {
            self.timers.cancel_all(session.id());
            out.session(session, ServerEvent::SessionEnded { reason: EndReason::Expired });
        }
        self.deliver(out);
        reclaimed.len()
    }

    // -- Queries ---------------------------------------------------------------

    pub fn snapshot(&self, id: SessionId) -> Option<SessionView> {
        self.store.get(id).map(Session::view)
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.store.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    pub fn active_timers(&self) -> usize {
        self.timers.active_count()
    }

    // -- Delivery --------------------------------------------------------------

    fn deliver(&self, out: Outgoing) {
        for (conn, event) in out.0 {
            self.send(conn, event);
        }
    }

    fn send(&self, conn: ConnectionId, event: ServerEvent) {
        match self.outboxes.get(&conn) {
            Some(outbox) => {
                if outbox.send(event).is_err() {
                    trace!(conn_id = %conn, "outbox closed, dropping event");
                }
            }
            None => trace!(conn_id = %conn, "no outbox attached, dropping event"),
        }
    }
}

fn lookup(store: &mut SessionStore, id: SessionId) -> Result<&mut Session, SessionError> {
    store.get_mut(id).ok_or(SessionError::NotFound(id))
}

fn roster_changed(session: &Session) -> ServerEvent {
    ServerEvent::RosterChanged {
        session: session.view(),
    }
}

fn phase_changed(session: &Session) -> ServerEvent {
    ServerEvent::PhaseChanged {
        phase: session.phase(),
        current_turn: session.current_turn(),
        turn_seconds_left: session.turn_seconds_left(),
        turn_order: session.turn_order().to_vec(),
    }
}

fn turn_changed(session: &Session) -> ServerEvent {
    ServerEvent::TurnChanged {
        current_turn: session.current_turn(),
        turn_seconds_left: session.turn_seconds_left(),
        turn_order: session.turn_order().to_vec(),
    }
}

fn timer_tick(session: &Session) -> ServerEvent {
    ServerEvent::TimerTick {
        phase: session.phase(),
        pre_game_seconds_left: session.pre_game_seconds_left(),
        turn_seconds_left: session.turn_seconds_left(),
        current_turn: session.current_turn(),
    }
}
