//! Core protocol types for Spyline's wire format.
//!
//! Every type here travels on the wire. Inbound and outbound enums are
//! internally tagged by `"type"` and use camelCase for both the tag and the
//! field names, matching what browser clients expect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use spyline_transport::ConnectionId;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque unique identifier of a game session.
///
/// A v4 UUID, so ids are collision-free without coordination and cannot be
/// guessed from one another. Serializes as the hyphenated string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Game vocabulary
// ---------------------------------------------------------------------------

/// The phase a session is in.
///
/// ```text
/// Lobby ──start──→ PreGame ──timer / ready──→ Playing ─┐
///   ↑                 │                         ↑  └turn timeout┘
///   └──── end / abort (via Ended) ─────────────┘
/// ```
///
/// `Ended` is transient: a session passes through it while its round state
/// is torn down and settles back in `Lobby` within the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Lobby,
    PreGame,
    Playing,
    Ended,
}

impl Phase {
    /// Returns `true` while a round is running (roles are assigned).
    pub fn is_in_game(&self) -> bool {
        matches!(self, Self::PreGame | Self::Playing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::PreGame => write!(f, "preGame"),
            Self::Playing => write!(f, "playing"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// What the impostor is told at game start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImpostorMode {
    /// The impostor receives no word at all.
    Wordless,
    /// The impostor receives a different word drawn from the same list.
    Distinct,
}

/// Why a round was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// A player asked to end the round.
    Requested,
    /// The roster dropped below the minimum while a round was running.
    NotEnoughPlayers,
    /// The session sat idle in the lobby past its retention period.
    Expired,
}

/// Machine-readable cause attached to every `actionError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorReason {
    NotFound,
    AlreadyStarted,
    NotHost,
    TooFewPlayers,
    InvalidWordList,
    NotMember,
    NotYourTurn,
    InvalidMessage,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// One roster entry as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub connection_id: ConnectionId,
    pub name: String,
}

/// The public projection of a session.
///
/// Never carries roles or words; those only travel in the per-recipient
/// [`ServerEvent::GameStarted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub host: ConnectionId,
    /// Join order, not turn order.
    pub players: Vec<PlayerView>,
    pub phase: Phase,
    pub turn_order: Vec<ConnectionId>,
    pub current_turn: Option<ConnectionId>,
    pub pre_game_seconds_left: u32,
    pub turn_seconds_left: u32,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Actions a connection can request.
///
/// The sender's identity is never part of the payload: the server attaches
/// the originating [`ConnectionId`] itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientAction {
    CreateSession {
        host_name: String,
    },
    JoinSession {
        session_id: SessionId,
        player_name: String,
    },
    /// Join, or take over the roster entry that already has this name.
    ReconnectSession {
        session_id: SessionId,
        player_name: String,
    },
    StartGame {
        session_id: SessionId,
        #[serde(default)]
        words: Vec<String>,
        mode: ImpostorMode,
    },
    /// Host skips the rest of the preparation countdown.
    Ready {
        session_id: SessionId,
    },
    /// The active player (or the host) finishes the current turn early.
    EndTurn {
        session_id: SessionId,
    },
    RequestEnd {
        session_id: SessionId,
    },
    LeaveSession {
        session_id: SessionId,
    },
}

impl ClientAction {
    /// The session this action targets, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::CreateSession { .. } => None,
            Self::JoinSession { session_id, .. }
            | Self::ReconnectSession { session_id, .. }
            | Self::StartGame { session_id, .. }
            | Self::Ready { session_id }
            | Self::EndTurn { session_id }
            | Self::RequestEnd { session_id }
            | Self::LeaveSession { session_id } => Some(*session_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Events the server sends to one connection or fans out to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// To the creator only.
    SessionCreated {
        session_id: SessionId,
        session: SessionView,
    },
    /// To the whole session on join, reconnect, leave, and disconnect.
    RosterChanged { session: SessionView },
    /// Per connection: the payload differs by recipient.
    GameStarted {
        is_impostor: bool,
        word: Option<String>,
        mode: ImpostorMode,
        turn_order: Vec<ConnectionId>,
        players: Vec<PlayerView>,
        phase: Phase,
        pre_game_seconds_left: u32,
    },
    /// PreGame → Playing.
    PhaseChanged {
        phase: Phase,
        current_turn: Option<ConnectionId>,
        turn_seconds_left: u32,
        turn_order: Vec<ConnectionId>,
    },
    TurnChanged {
        current_turn: Option<ConnectionId>,
        turn_seconds_left: u32,
        turn_order: Vec<ConnectionId>,
    },
    /// Once per countdown tick.
    TimerTick {
        phase: Phase,
        pre_game_seconds_left: u32,
        turn_seconds_left: u32,
        current_turn: Option<ConnectionId>,
    },
    SessionEnded { reason: EndReason },
    /// To the leaver only, after `leaveSession`.
    LeftSession { session_id: SessionId },
    /// To the originating connection only.
    ActionError { reason: ErrorReason, message: String },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes below are what browser clients parse; a renamed
    //! field here is a broken client.

    use super::*;

    fn sid() -> SessionId {
        "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap()
    }

    #[test]
    fn test_session_id_serializes_as_hyphenated_string() {
        let json = serde_json::to_string(&sid()).unwrap();
        assert_eq!(json, r#""67e55044-10b1-426f-9247-bb680e5fe0c8""#);
        assert_eq!(sid().to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn test_session_id_new_v4_is_unique() {
        assert_ne!(SessionId::new_v4(), SessionId::new_v4());
    }

    #[test]
    fn test_session_id_rejects_garbage() {
        assert!("not-a-session".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_phase_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::PreGame).unwrap(), r#""preGame""#);
        assert_eq!(serde_json::to_string(&Phase::Lobby).unwrap(), r#""lobby""#);
        assert_eq!(Phase::Playing.to_string(), "playing");
        assert_eq!(Phase::default(), Phase::Lobby);
    }

    #[test]
    fn test_phase_is_in_game() {
        assert!(!Phase::Lobby.is_in_game());
        assert!(Phase::PreGame.is_in_game());
        assert!(Phase::Playing.is_in_game());
        assert!(!Phase::Ended.is_in_game());
    }

    #[test]
    fn test_start_game_action_json_format() {
        let json = format!(
            r#"{{"type":"startGame","sessionId":"{}","words":["apple","banana"],"mode":"distinct"}}"#,
            sid()
        );
        let action: ClientAction = serde_json::from_str(&json).unwrap();
        assert_eq!(
            action,
            ClientAction::StartGame {
                session_id: sid(),
                words: vec!["apple".into(), "banana".into()],
                mode: ImpostorMode::Distinct,
            }
        );
        assert_eq!(action.session_id(), Some(sid()));
    }

    #[test]
    fn test_start_game_missing_words_defaults_to_empty() {
        let json = format!(r#"{{"type":"startGame","sessionId":"{}","mode":"wordless"}}"#, sid());
        let action: ClientAction = serde_json::from_str(&json).unwrap();
        assert!(matches!(action, ClientAction::StartGame { words, .. } if words.is_empty()));
    }

    #[test]
    fn test_create_session_has_no_session_id() {
        let action = ClientAction::CreateSession { host_name: "Ana".into() };
        assert_eq!(action.session_id(), None);
        let json: serde_json::Value = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "createSession");
        assert_eq!(json["hostName"], "Ana");
    }

    #[test]
    fn test_game_started_json_format() {
        let event = ServerEvent::GameStarted {
            is_impostor: true,
            word: None,
            mode: ImpostorMode::Wordless,
            turn_order: vec![ConnectionId::new(2), ConnectionId::new(1)],
            players: vec![PlayerView { connection_id: ConnectionId::new(1), name: "A".into() }],
            phase: Phase::PreGame,
            pre_game_seconds_left: 30,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "gameStarted");
        assert_eq!(json["isImpostor"], true);
        assert!(json["word"].is_null());
        assert_eq!(json["mode"], "wordless");
        assert_eq!(json["turnOrder"], serde_json::json!([2, 1]));
        assert_eq!(json["players"][0]["connectionId"], 1);
        assert_eq!(json["preGameSecondsLeft"], 30);
    }

    #[test]
    fn test_timer_tick_json_format() {
        let event = ServerEvent::TimerTick {
            phase: Phase::Playing,
            pre_game_seconds_left: 0,
            turn_seconds_left: 41,
            current_turn: Some(ConnectionId::new(3)),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "timerTick");
        assert_eq!(json["phase"], "playing");
        assert_eq!(json["turnSecondsLeft"], 41);
        assert_eq!(json["currentTurn"], 3);
    }

    #[test]
    fn test_session_ended_json_format() {
        let event = ServerEvent::SessionEnded { reason: EndReason::NotEnoughPlayers };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"type": "sessionEnded", "reason": "notEnoughPlayers"}));
    }
}
