//! The session data model.
//!
//! A [`Session`] is one game instance. Its fields are private: the roster
//! operations in `roster.rs` and the phase transitions below are the only
//! way to change it, which is what keeps the invariants true:
//!
//! - exactly one [`Phase`] at a time, changed only by a transition;
//! - `turn_order` holds only ids present in `players`, and the cursor is
//!   always in range;
//! - roles are assigned to every player at once or to none;
//! - the roster is never empty (the store deletes empty sessions).

use std::collections::HashMap;
use std::time::Instant;

use spyline_protocol::{
    ConnectionId, ImpostorMode, Phase, PlayerView, ServerEvent, SessionId, SessionView,
};

use crate::SessionError;

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub connection_id: ConnectionId,
    pub name: String,
}

/// What one player was told at game start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub is_impostor: bool,
    /// `None` for the impostor in wordless mode.
    pub secret_word: Option<String>,
}

/// A completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub player: ConnectionId,
    /// 1-based round the turn belonged to.
    pub round: u32,
}

/// The words drawn for the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundWords {
    pub villager: String,
    pub impostor: Option<String>,
}

/// Everything the phase machine decided at game start, applied in one step.
#[derive(Debug, Clone)]
pub struct RoundSetup {
    pub mode: ImpostorMode,
    pub words: RoundWords,
    pub impostor: ConnectionId,
    pub turn_order: Vec<ConnectionId>,
    pub pre_game_seconds: u32,
}

/// One game instance.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    host: ConnectionId,
    pub(crate) players: Vec<Player>,
    phase: Phase,
    pub(crate) turn_order: Vec<ConnectionId>,
    pub(crate) turn_cursor: usize,
    pub(crate) roles: HashMap<ConnectionId, Role>,
    round: Option<(ImpostorMode, RoundWords)>,
    pre_game_seconds_left: u32,
    turn_seconds_left: u32,
    base_turn_seconds: u32,
    pub(crate) round_history: Vec<TurnRecord>,
    created_at: Instant,
    has_started: bool,
}

impl Session {
    /// A fresh lobby whose only player is the host.
    pub(crate) fn new(id: SessionId, host: ConnectionId, host_name: String, now: Instant) -> Self {
        Self {
            id,
            host,
            players: vec![Player { connection_id: host, name: host_name }],
            phase: Phase::Lobby,
            turn_order: Vec::new(),
            turn_cursor: 0,
            roles: HashMap::new(),
            round: None,
            pre_game_seconds_left: 0,
            turn_seconds_left: 0,
            base_turn_seconds: 0,
            round_history: Vec::new(),
            created_at: now,
            has_started: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn host(&self) -> ConnectionId {
        self.host
    }

    pub(crate) fn set_host(&mut self, host: ConnectionId) {
        self.host = host;
    }

    pub fn is_host(&self, conn: ConnectionId) -> bool {
        self.host == conn
    }

    /// Players in join order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.players.iter().any(|p| p.connection_id == conn)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turn_order(&self) -> &[ConnectionId] {
        &self.turn_order
    }

    pub fn turn_cursor(&self) -> usize {
        self.turn_cursor
    }

    /// Whose turn it is. Only meaningful while `Playing`.
    pub fn current_turn(&self) -> Option<ConnectionId> {
        if self.phase == Phase::Playing {
            self.turn_order.get(self.turn_cursor).copied()
        } else {
            None
        }
    }

    pub fn role(&self, conn: ConnectionId) -> Option<&Role> {
        self.roles.get(&conn)
    }

    pub fn roles(&self) -> &HashMap<ConnectionId, Role> {
        &self.roles
    }

    /// The current impostor, if a round is running.
    pub fn impostor(&self) -> Option<ConnectionId> {
        self.roles
            .iter()
            .find_map(|(conn, role)| role.is_impostor.then_some(*conn))
    }

    pub fn mode(&self) -> Option<ImpostorMode> {
        self.round.as_ref().map(|(mode, _)| *mode)
    }

    pub fn words(&self) -> Option<&RoundWords> {
        self.round.as_ref().map(|(_, words)| words)
    }

    pub fn pre_game_seconds_left(&self) -> u32 {
        self.pre_game_seconds_left
    }

    pub fn turn_seconds_left(&self) -> u32 {
        self.turn_seconds_left
    }

    /// The per-turn budget computed when play began.
    pub fn base_turn_seconds(&self) -> u32 {
        self.base_turn_seconds
    }

    pub fn round_history(&self) -> &[TurnRecord] {
        &self.round_history
    }

    pub fn completed_turns(&self) -> usize {
        self.round_history.len()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether this session has ever left the lobby.
    pub fn has_started(&self) -> bool {
        self.has_started
    }

    // -- Countdowns --------------------------------------------------------

    pub fn set_pre_game_seconds_left(&mut self, seconds: u32) {
        self.pre_game_seconds_left = seconds;
    }

    pub fn set_turn_seconds_left(&mut self, seconds: u32) {
        self.turn_seconds_left = seconds;
    }

    // -- Phase transitions --------------------------------------------------

    /// `Lobby → PreGame`: assigns every player's role and fixes the turn order.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyStarted`] outside the lobby.
    /// - [`SessionError::NotMember`] if the impostor or a turn-order entry is
    ///   not on the roster. Nothing is modified on error.
    pub fn enter_pre_game(&mut self, setup: RoundSetup) -> Result<(), SessionError> {
        if self.phase != Phase::Lobby {
            return Err(SessionError::AlreadyStarted(self.id));
        }
        if !self.contains(setup.impostor) {
            return Err(SessionError::NotMember(setup.impostor));
        }
        if let Some(stray) = setup.turn_order.iter().find(|c| !self.contains(**c)) {
            return Err(SessionError::NotMember(*stray));
        }
        if setup.turn_order.len() != self.players.len() {
            if let Some(missing) = self
                .players
                .iter()
                .find(|p| !setup.turn_order.contains(&p.connection_id))
            {
                return Err(SessionError::NotMember(missing.connection_id));
            }
        }

        self.roles = assign_roles(&self.players, setup.impostor, &setup.words);
        self.round = Some((setup.mode, setup.words));
        self.turn_order = setup.turn_order;
        self.turn_cursor = 0;
        self.round_history.clear();
        self.pre_game_seconds_left = setup.pre_game_seconds;
        self.turn_seconds_left = 0;
        self.base_turn_seconds = 0;
        self.has_started = true;
        self.phase = Phase::PreGame;
        Ok(())
    }

    /// `PreGame → Playing`: the first player in turn order is up.
    ///
    /// Returns `false` (and changes nothing) outside `PreGame`.
    pub fn enter_playing(&mut self, turn_seconds: u32) -> bool {
        if self.phase != Phase::PreGame {
            return false;
        }
        self.phase = Phase::Playing;
        self.turn_cursor = 0;
        self.base_turn_seconds = turn_seconds;
        self.turn_seconds_left = turn_seconds;
        self.pre_game_seconds_left = 0;
        true
    }

    /// Logs the active player's turn and moves the cursor to the next
    /// player, wrapping. The countdown is left for the caller to set.
    pub fn complete_turn(&mut self) -> Option<TurnRecord> {
        let player = self.current_turn()?;
        let per_round = self.turn_order.len().max(1);
        let record = TurnRecord {
            player,
            round: (self.round_history.len() / per_round) as u32 + 1,
        };
        self.round_history.push(record.clone());
        self.turn_cursor = (self.turn_cursor + 1) % self.turn_order.len();
        Some(record)
    }

    /// Tears down the round: `PreGame | Playing → Ended → Lobby`.
    ///
    /// Returns the phase the session was in, or `None` (no change) if no
    /// round was running.
    pub fn end_round(&mut self) -> Option<Phase> {
        if !self.phase.is_in_game() {
            return None;
        }
        let previous = self.phase;
        self.phase = Phase::Ended;
        self.roles.clear();
        self.round = None;
        self.turn_order.clear();
        self.turn_cursor = 0;
        self.round_history.clear();
        self.pre_game_seconds_left = 0;
        self.turn_seconds_left = 0;
        self.base_turn_seconds = 0;
        self.phase = Phase::Lobby;
        Some(previous)
    }

    /// Hands the impostor role to `conn`, keeping this round's words.
    ///
    /// Returns `false` if no round is running or `conn` is not a player.
    pub fn reassign_impostor(&mut self, conn: ConnectionId) -> bool {
        if !self.phase.is_in_game() || !self.contains(conn) {
            return false;
        }
        let Some((_, words)) = &self.round else {
            return false;
        };
        self.roles = assign_roles(&self.players, conn, words);
        true
    }

    // -- Projections ---------------------------------------------------------

    /// The public, role-free view sent in roster broadcasts.
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            host: self.host,
            players: self.player_views(),
            phase: self.phase,
            turn_order: self.turn_order.clone(),
            current_turn: self.current_turn(),
            pre_game_seconds_left: self.pre_game_seconds_left,
            turn_seconds_left: self.turn_seconds_left,
        }
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players
            .iter()
            .map(|p| PlayerView {
                connection_id: p.connection_id,
                name: p.name.clone(),
            })
            .collect()
    }

    /// The `gameStarted` payload for one recipient, or `None` if no round
    /// is running or `conn` holds no role.
    pub fn game_started_for(&self, conn: ConnectionId) -> Option<ServerEvent> {
        let role = self.roles.get(&conn)?;
        let mode = self.mode()?;
        Some(ServerEvent::GameStarted {
            is_impostor: role.is_impostor,
            word: role.secret_word.clone(),
            mode,
            turn_order: self.turn_order.clone(),
            players: self.player_views(),
            phase: self.phase,
            pre_game_seconds_left: self.pre_game_seconds_left,
        })
    }
}

fn assign_roles(
    players: &[Player],
    impostor: ConnectionId,
    words: &RoundWords,
) -> HashMap<ConnectionId, Role> {
    players
        .iter()
        .map(|p| {
            let is_impostor = p.connection_id == impostor;
            let secret_word = if is_impostor {
                words.impostor.clone()
            } else {
                Some(words.villager.clone())
            };
            (p.connection_id, Role { is_impostor, secret_word })
        })
        .collect()
}
