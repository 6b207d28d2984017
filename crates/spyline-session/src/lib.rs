//! Session state for Spyline.
//!
//! This crate owns the data side of the orchestrator:
//!
//! 1. **Data model**: [`Session`], its [`Player`] roster, per-player
//!    [`Role`]s, the turn order and countdown values.
//! 2. **Store**: [`SessionStore`], the owned map from [`SessionId`] to
//!    session. No timers, no I/O.
//! 3. **Roster**: join, rename-on-reconnect, merge-by-name, removal with
//!    host reassignment and turn-order repair (see `roster.rs`).
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (spyline)          ← one event loop, owns the store
//!     ↕
//! Phase machine (spyline-game) ← decides transitions, draws roles
//!     ↕
//! Session layer (this crate)   ← holds and mutates the data
//!     ↕
//! Protocol (spyline-protocol)  ← SessionId, ConnectionId, Phase, views
//! ```
//!
//! [`SessionId`]: spyline_protocol::SessionId

mod config;
mod error;
mod roster;
mod session;
mod store;

pub use config::SessionConfig;
pub use error::SessionError;
pub use roster::{JoinOutcome, MIN_PLAYERS_TO_START, MergeOutcome, Removal, TurnImpact};
pub use session::{Player, Role, RoundSetup, RoundWords, Session, TurnRecord};
pub use store::SessionStore;
