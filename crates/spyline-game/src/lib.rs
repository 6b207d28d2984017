//! Game rules and the phase machine for Spyline.
//!
//! # Key types
//!
//! - [`PhaseMachine`]: validates actions and drives phase transitions
//! - [`GameRules`]: start threshold, [`CountdownPolicy`], [`ImpostorDeparture`]
//! - [`TimerCommand`]: timer work a transition hands back to its caller
//!
//! The random draws (words, impostor, turn order) live in [`roles`] and are
//! generic over any [`rand::Rng`], so tests drive them with a seeded
//! `StdRng`.

mod config;
mod machine;
pub mod roles;

pub use config::{CountdownPolicy, GameRules, ImpostorDeparture};
pub use machine::{Departure, DepartureEffect, PhaseMachine, TimerCommand, apply_all};
