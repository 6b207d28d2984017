//! Game rules: start threshold, countdown lengths, impostor departure.

use serde::{Deserialize, Serialize};
use spyline_session::MIN_PLAYERS_TO_START;
use tracing::warn;

// ---------------------------------------------------------------------------
// CountdownPolicy
// ---------------------------------------------------------------------------

/// How long each countdown runs, in seconds.
///
/// The defaults give:
///
/// - pre-game: `30 + 5 × max(0, players − 3)`
/// - first turn: `60 + 10 × max(0, 5 − players)`
/// - later turns: `max(30, base − 5 × ⌊completed / players⌋)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownPolicy {
    pub pre_game_base: u32,
    /// Extra pre-game seconds for each player beyond `MIN_PLAYERS_TO_START`.
    pub pre_game_per_extra_player: u32,
    pub turn_base: u32,
    /// Extra turn seconds for each player short of `turn_reference_players`.
    pub turn_per_missing_player: u32,
    pub turn_reference_players: u32,
    /// Seconds shaved off the turn budget per completed round.
    pub round_decrement: u32,
    /// The turn budget never drops below this.
    pub turn_floor: u32,
}

impl Default for CountdownPolicy {
    fn default() -> Self {
        Self {
            pre_game_base: 30,
            pre_game_per_extra_player: 5,
            turn_base: 60,
            turn_per_missing_player: 10,
            turn_reference_players: 5,
            round_decrement: 5,
            turn_floor: 30,
        }
    }
}

impl CountdownPolicy {
    pub fn pre_game_seconds(&self, players: usize) -> u32 {
        let extra = saturating_u32(players.saturating_sub(MIN_PLAYERS_TO_START));
        self.pre_game_base
            .saturating_add(self.pre_game_per_extra_player.saturating_mul(extra))
    }

    /// The turn budget set when play begins; stored as the session's base.
    pub fn turn_seconds_at_entry(&self, players: usize) -> u32 {
        let missing = self.turn_reference_players.saturating_sub(saturating_u32(players));
        self.turn_base
            .saturating_add(self.turn_per_missing_player.saturating_mul(missing))
    }

    /// The turn budget after `completed` turns with `players` in rotation.
    pub fn turn_seconds_on_rotation(&self, base: u32, completed: usize, players: usize) -> u32 {
        let rounds = saturating_u32(completed / players.max(1));
        base.saturating_sub(self.round_decrement.saturating_mul(rounds))
            .max(self.turn_floor)
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// ImpostorDeparture
// ---------------------------------------------------------------------------

/// What happens when the impostor leaves before play begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImpostorDeparture {
    /// The round carries on without an impostor.
    #[default]
    Keep,
    /// A new impostor is drawn from the remaining players during PreGame.
    Reroll,
}

// ---------------------------------------------------------------------------
// GameRules
// ---------------------------------------------------------------------------

/// Everything the phase machine needs to know about the rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Players needed to start, and to keep a round alive.
    pub min_players: usize,
    pub countdown: CountdownPolicy,
    pub impostor_departure: ImpostorDeparture,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            min_players: MIN_PLAYERS_TO_START,
            countdown: CountdownPolicy::default(),
            impostor_departure: ImpostorDeparture::default(),
        }
    }
}

impl GameRules {
    /// Clamp out-of-range values.
    ///
    /// - `min_players` is raised to at least [`MIN_PLAYERS_TO_START`].
    /// - `turn_floor` of zero is raised to one second.
    pub fn validated(mut self) -> Self {
        if self.min_players < MIN_PLAYERS_TO_START {
            warn!(
                min_players = self.min_players,
                floor = MIN_PLAYERS_TO_START,
                "min_players below the fixed threshold, clamping"
            );
            self.min_players = MIN_PLAYERS_TO_START;
        }
        if self.countdown.turn_floor == 0 {
            warn!("turn_floor of 0 would end turns instantly, clamping to 1");
            self.countdown.turn_floor = 1;
        }
        self
    }
}
