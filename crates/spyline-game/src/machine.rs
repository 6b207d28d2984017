//! The phase machine: every transition a session can make.
//!
//! ```text
//! Lobby ──start──→ PreGame ──pre-game expiry / ready──→ Playing ─┐
//!   ↑                 │                                  ↑  └turn expiry / endTurn┘
//!   └── end / roster below minimum (via Ended) ──────────┘
//! ```
//!
//! The machine mutates the [`Session`] it is handed and returns the timer
//! work the caller must carry out afterwards, as [`TimerCommand`]s. It
//! never touches the scheduler itself, so every transition is synchronous
//! and can be tested without a runtime.

use rand::Rng;
use spyline_protocol::{ConnectionId, EndReason, ImpostorMode, Phase, SessionId};
use spyline_session::{Removal, RoundSetup, Session, SessionError, TurnImpact};
use spyline_timer::{TimerKind, TimerScheduler};
use tracing::{debug, info};

use crate::roles::{draw_impostor, draw_words, shuffled_turn_order};
use crate::{GameRules, ImpostorDeparture};

/// Timer work produced by a transition, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Replace the countdown of this kind with a fresh one.
    Start { kind: TimerKind, seconds: u32 },
    Cancel(TimerKind),
    CancelAll,
}

impl TimerCommand {
    pub fn apply(self, timers: &mut TimerScheduler, session: SessionId) {
        match self {
            Self::Start { kind, seconds } => {
                timers.start(session, kind, seconds);
            }
            Self::Cancel(kind) => {
                timers.cancel(session, kind);
            }
            Self::CancelAll => timers.cancel_all(session),
        }
    }
}

/// Applies a batch of commands in order.
pub fn apply_all(commands: &[TimerCommand], timers: &mut TimerScheduler, session: SessionId) {
    for command in commands {
        command.apply(timers, session);
    }
}

/// What a departure did beyond removing the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureEffect {
    /// Nothing else changed.
    RosterOnly,
    /// The roster is now empty; the caller must delete the session.
    SessionEmptied,
    /// The roster fell below the minimum and the round was torn down.
    RoundAborted,
    /// The leaver held the active turn; `next` holds it now with a fresh countdown.
    TurnPassed { next: ConnectionId },
    /// The leaver was the impostor and a replacement was drawn.
    ImpostorRerolled { impostor: ConnectionId },
}

/// The result of [`PhaseMachine::depart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub removal: Removal,
    pub effect: DepartureEffect,
    pub timers: Vec<TimerCommand>,
}

/// Decides and applies phase transitions under one set of [`GameRules`].
#[derive(Debug, Clone, Default)]
pub struct PhaseMachine {
    rules: GameRules,
}

impl PhaseMachine {
    pub fn new(rules: GameRules) -> Self {
        Self {
            rules: rules.validated(),
        }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// `Lobby → PreGame`.
    ///
    /// Checks run in this order, and nothing is modified if any fails:
    /// membership, host, phase, roster size, word list.
    pub fn start<R: Rng + ?Sized>(
        &self,
        session: &mut Session,
        caller: ConnectionId,
        words: &[String],
        mode: ImpostorMode,
        rng: &mut R,
    ) -> Result<Vec<TimerCommand>, SessionError> {
        require_host(session, caller)?;
        if session.phase() != Phase::Lobby {
            return Err(SessionError::AlreadyStarted(session.id()));
        }
        if session.player_count() < self.rules.min_players {
            return Err(SessionError::TooFewPlayers {
                have: session.player_count(),
                need: self.rules.min_players,
            });
        }
        let words = draw_words(words, mode, rng)?;
        let impostor =
            draw_impostor(session.players(), rng).ok_or(SessionError::NotMember(caller))?;
        let turn_order = shuffled_turn_order(session.players(), rng);
        let pre_game_seconds = self.rules.countdown.pre_game_seconds(session.player_count());

        session.enter_pre_game(RoundSetup {
            mode,
            words,
            impostor,
            turn_order,
            pre_game_seconds,
        })?;

        info!(
            session_id = %session.id(),
            players = session.player_count(),
            ?mode,
            pre_game_seconds,
            "game started"
        );
        Ok(vec![TimerCommand::Start {
            kind: TimerKind::PreGame,
            seconds: pre_game_seconds,
        }])
    }

    /// `PreGame → Playing`. `None` outside `PreGame`.
    pub fn begin_play(&self, session: &mut Session) -> Option<Vec<TimerCommand>> {
        if session.phase() != Phase::PreGame {
            return None;
        }
        let seconds = self
            .rules
            .countdown
            .turn_seconds_at_entry(session.turn_order().len());
        session.enter_playing(seconds);
        info!(
            session_id = %session.id(),
            first = ?session.current_turn(),
            turn_seconds = seconds,
            "play begins"
        );
        Some(vec![
            TimerCommand::Cancel(TimerKind::PreGame),
            TimerCommand::Start {
                kind: TimerKind::Turn,
                seconds,
            },
        ])
    }

    /// Host ends the pre-game countdown early. `Ok(None)` outside `PreGame`.
    pub fn ready(
        &self,
        session: &mut Session,
        caller: ConnectionId,
    ) -> Result<Option<Vec<TimerCommand>>, SessionError> {
        require_host(session, caller)?;
        Ok(self.begin_play(session))
    }

    /// `Playing → Playing`: log the turn, pass it on, restart the countdown.
    /// `None` outside `Playing`.
    pub fn rotate(&self, session: &mut Session) -> Option<Vec<TimerCommand>> {
        let record = session.complete_turn()?;
        let seconds = self.rotation_seconds(session);
        session.set_turn_seconds_left(seconds);
        debug!(
            session_id = %session.id(),
            finished = %record.player,
            round = record.round,
            next = ?session.current_turn(),
            turn_seconds = seconds,
            "turn rotated"
        );
        Some(vec![TimerCommand::Start {
            kind: TimerKind::Turn,
            seconds,
        }])
    }

    /// The active player (or the host) ends the turn early.
    /// `Ok(None)` outside `Playing`.
    pub fn end_turn(
        &self,
        session: &mut Session,
        caller: ConnectionId,
    ) -> Result<Option<Vec<TimerCommand>>, SessionError> {
        require_member(session, caller)?;
        if session.phase() != Phase::Playing {
            return Ok(None);
        }
        if session.current_turn() != Some(caller) && !session.is_host(caller) {
            return Err(SessionError::NotYourTurn(caller));
        }
        Ok(self.rotate(session))
    }

    /// Tears the round down to `Lobby`. `None` if no round was running.
    pub fn end(&self, session: &mut Session, reason: EndReason) -> Option<Vec<TimerCommand>> {
        let previous = session.end_round()?;
        info!(session_id = %session.id(), from = %previous, ?reason, "round ended");
        Some(vec![TimerCommand::CancelAll])
    }

    /// Any member ends the round. `Ok(None)` in the lobby.
    pub fn request_end(
        &self,
        session: &mut Session,
        caller: ConnectionId,
    ) -> Result<Option<Vec<TimerCommand>>, SessionError> {
        require_member(session, caller)?;
        Ok(self.end(session, EndReason::Requested))
    }

    /// Removes `conn` and settles whatever its absence breaks.
    ///
    /// # Errors
    /// [`SessionError::NotMember`] if `conn` is not on the roster.
    pub fn depart<R: Rng + ?Sized>(
        &self,
        session: &mut Session,
        conn: ConnectionId,
        rng: &mut R,
    ) -> Result<Departure, SessionError> {
        let phase = session.phase();
        let removal = session.remove(conn)?;

        if removal.remaining == 0 {
            return Ok(Departure {
                removal,
                effect: DepartureEffect::SessionEmptied,
                timers: vec![TimerCommand::CancelAll],
            });
        }

        if phase.is_in_game() && removal.remaining < self.rules.min_players {
            let timers = self
                .end(session, EndReason::NotEnoughPlayers)
                .unwrap_or_default();
            return Ok(Departure {
                removal,
                effect: DepartureEffect::RoundAborted,
                timers,
            });
        }

        if let TurnImpact::ActiveHolderReplaced { next } = removal.turn {
            let seconds = self.rotation_seconds(session);
            session.set_turn_seconds_left(seconds);
            debug!(session_id = %session.id(), %next, turn_seconds = seconds, "turn passed after departure");
            return Ok(Departure {
                removal,
                effect: DepartureEffect::TurnPassed { next },
                timers: vec![TimerCommand::Start {
                    kind: TimerKind::Turn,
                    seconds,
                }],
            });
        }

        if removal.was_impostor
            && phase == Phase::PreGame
            && self.rules.impostor_departure == ImpostorDeparture::Reroll
        {
            if let Some(impostor) = draw_impostor(session.players(), rng) {
                session.reassign_impostor(impostor);
                info!(session_id = %session.id(), "impostor left, new impostor drawn");
                return Ok(Departure {
                    removal,
                    effect: DepartureEffect::ImpostorRerolled { impostor },
                    timers: Vec::new(),
                });
            }
        }

        Ok(Departure {
            removal,
            effect: DepartureEffect::RosterOnly,
            timers: Vec::new(),
        })
    }

    fn rotation_seconds(&self, session: &Session) -> u32 {
        self.rules.countdown.turn_seconds_on_rotation(
            session.base_turn_seconds(),
            session.completed_turns(),
            session.turn_order().len(),
        )
    }
}

fn require_member(session: &Session, caller: ConnectionId) -> Result<(), SessionError> {
    if session.contains(caller) {
        Ok(())
    } else {
        Err(SessionError::NotMember(caller))
    }
}

fn require_host(session: &Session, caller: ConnectionId) -> Result<(), SessionError> {
    require_member(session, caller)?;
    if session.is_host(caller) {
        Ok(())
    } else {
        Err(SessionError::NotHost(caller))
    }
}
