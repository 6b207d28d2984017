//! Roster operations: join, removal and reconnect-by-name.
//!
//! These are methods on [`Session`] so they can reach its private fields;
//! they live in their own file because they carry most of the invariant
//! bookkeeping (host reassignment, turn-order excision, cursor repair).

use spyline_protocol::{ConnectionId, Phase};

use crate::{Player, Session, SessionError};

/// A game cannot start with fewer players than this.
pub const MIN_PLAYERS_TO_START: usize = 3;

/// What [`Session::join`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new roster entry was appended.
    Joined,
    /// The connection was already on the roster; its name was updated in place.
    Renamed { previous: String },
}

/// How a removal affected the turn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnImpact {
    /// The player had no place in the turn order (lobby, or already gone).
    NotInTurnOrder,
    /// The player was excised; the active turn holder did not change.
    Excised,
    /// The player held the active turn. The cursor now points at `next`,
    /// whose countdown needs resetting.
    ActiveHolderReplaced { next: ConnectionId },
}

/// The result of [`Session::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub player: Player,
    /// Set when the removed player was host and someone remains.
    pub new_host: Option<ConnectionId>,
    pub turn: TurnImpact,
    pub was_impostor: bool,
    /// Roster size after the removal. Zero means the session must be deleted.
    pub remaining: usize,
}

/// What [`Session::merge_by_name`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The entry named so now belongs to the new connection; `previous` is
    /// the id it replaced everywhere.
    Merged { previous: ConnectionId },
    /// The connection is already on the roster. Nothing changed.
    AlreadyMember,
    /// Nobody on the roster has this name.
    NoMatch,
}

impl Session {
    /// Adds a player, or renames them if the connection is already present.
    ///
    /// # Errors
    /// [`SessionError::AlreadyStarted`] unless the session is in the lobby.
    pub fn join(&mut self, conn: ConnectionId, name: String) -> Result<JoinOutcome, SessionError> {
        if self.phase() != Phase::Lobby {
            return Err(SessionError::AlreadyStarted(self.id()));
        }
        if let Some(existing) = self.players.iter_mut().find(|p| p.connection_id == conn) {
            let previous = std::mem::replace(&mut existing.name, name);
            return Ok(JoinOutcome::Renamed { previous });
        }
        self.players.push(Player { connection_id: conn, name });
        Ok(JoinOutcome::Joined)
    }

    /// Removes a player and repairs everything that referenced them.
    ///
    /// The host passes to the earliest-joined survivor. If the player held
    /// the active turn, the cursor stays on the same index (now the next
    /// survivor), wrapping to the start when it falls off the end. A removed
    /// entry before the cursor shifts the cursor down by one so the active
    /// holder does not change.
    ///
    /// # Errors
    /// [`SessionError::NotMember`] if `conn` is not on the roster.
    pub fn remove(&mut self, conn: ConnectionId) -> Result<Removal, SessionError> {
        let index = self
            .players
            .iter()
            .position(|p| p.connection_id == conn)
            .ok_or(SessionError::NotMember(conn))?;
        let player = self.players.remove(index);
        let was_impostor = self.roles.remove(&conn).is_some_and(|r| r.is_impostor);

        let new_host = match self.players.first() {
            Some(first) if self.is_host(conn) => {
                let next = first.connection_id;
                self.set_host(next);
                Some(next)
            }
            _ => None,
        };

        let turn = self.excise_from_turn_order(conn);

        Ok(Removal {
            player,
            new_host,
            turn,
            was_impostor,
            remaining: self.players.len(),
        })
    }

    fn excise_from_turn_order(&mut self, conn: ConnectionId) -> TurnImpact {
        let Some(pos) = self.turn_order.iter().position(|c| *c == conn) else {
            return TurnImpact::NotInTurnOrder;
        };
        let was_active = self.phase() == Phase::Playing && pos == self.turn_cursor;
        self.turn_order.remove(pos);

        if pos < self.turn_cursor {
            self.turn_cursor -= 1;
        }
        if self.turn_cursor >= self.turn_order.len() {
            self.turn_cursor = 0;
        }

        match self.turn_order.get(self.turn_cursor) {
            Some(next) if was_active => TurnImpact::ActiveHolderReplaced { next: *next },
            _ => TurnImpact::Excised,
        }
    }

    /// Hands the roster entry called `name` to a new connection.
    ///
    /// The old connection id is replaced wherever it appears: the roster
    /// entry, the host slot, the turn order, the role map and the turn
    /// history. Names are trusted as-is; there is no identity check beyond
    /// the display name. If several entries share the name, the earliest
    /// joined one is taken.
    pub fn merge_by_name(&mut self, conn: ConnectionId, name: &str) -> MergeOutcome {
        if self.contains(conn) {
            return MergeOutcome::AlreadyMember;
        }
        let Some(entry) = self.players.iter_mut().find(|p| p.name == name) else {
            return MergeOutcome::NoMatch;
        };
        let previous = std::mem::replace(&mut entry.connection_id, conn);

        if self.is_host(previous) {
            self.set_host(conn);
        }
        for slot in self.turn_order.iter_mut().filter(|c| **c == previous) {
            *slot = conn;
        }
        if let Some(role) = self.roles.remove(&previous) {
            self.roles.insert(conn, role);
        }
        for record in self.round_history.iter_mut().filter(|r| r.player == previous) {
            record.player = conn;
        }

        MergeOutcome::Merged { previous }
    }
}
