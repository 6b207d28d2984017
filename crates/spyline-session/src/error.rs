//! Error types for session operations.

use spyline_protocol::{ConnectionId, ErrorReason, SessionId};

/// Every way an inbound action can be refused.
///
/// All variants are recoverable: they are reported to the originating
/// connection only, and the session they name is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No session exists with this id (never created, or already deleted).
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// Joining is only possible while the session is in the lobby.
    #[error("session {0} has already started")]
    AlreadyStarted(SessionId),

    /// A privileged action was attempted by someone other than the host.
    #[error("{0} is not the host")]
    NotHost(ConnectionId),

    /// Starting requires a minimum roster size.
    #[error("at least {need} players are required to start, have {have}")]
    TooFewPlayers { have: usize, need: usize },

    /// The word list was empty or held only blank entries.
    #[error("word list must contain at least one non-empty word")]
    InvalidWordList,

    /// The connection is not part of the session it addressed.
    #[error("{0} is not a member of this session")]
    NotMember(ConnectionId),

    /// Only the active player (or the host) may end the current turn.
    #[error("it is not {0}'s turn")]
    NotYourTurn(ConnectionId),
}

impl SessionError {
    /// The wire-level reason code for this error.
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::NotFound(_) => ErrorReason::NotFound,
            Self::AlreadyStarted(_) => ErrorReason::AlreadyStarted,
            Self::NotHost(_) => ErrorReason::NotHost,
            Self::TooFewPlayers { .. } => ErrorReason::TooFewPlayers,
            Self::InvalidWordList => ErrorReason::InvalidWordList,
            Self::NotMember(_) => ErrorReason::NotMember,
            Self::NotYourTurn(_) => ErrorReason::NotYourTurn,
        }
    }
}
