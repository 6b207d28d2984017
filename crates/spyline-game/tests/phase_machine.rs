//! Integration tests for the phase machine over real sessions.
//!
//! Randomness is driven by seeded `StdRng`s so each scenario is
//! reproducible; properties are checked across many seeds.

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use spyline_game::{
    DepartureEffect, GameRules, ImpostorDeparture, PhaseMachine, TimerCommand,
};
use spyline_protocol::{ConnectionId, EndReason, ImpostorMode, Phase, SessionId};
use spyline_session::{Session, SessionConfig, SessionError, SessionStore};
use spyline_timer::TimerKind;

// =========================================================================
// Helpers
// =========================================================================

fn conn(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// A store holding one lobby with players `1..=n`, player 1 hosting.
fn lobby(n: u64) -> (SessionStore, SessionId) {
    let mut store = SessionStore::new(SessionConfig::default());
    let (id, _) = store.create(conn(1), "P1".into());
    let session = store.get_mut(id).unwrap();
    for i in 2..=n {
        session.join(conn(i), format!("P{i}")).unwrap();
    }
    (store, id)
}

fn started(n: u64, seed: u64, machine: &PhaseMachine) -> (SessionStore, SessionId) {
    let (mut store, id) = lobby(n);
    let mut rng = StdRng::seed_from_u64(seed);
    machine
        .start(
            store.get_mut(id).unwrap(),
            conn(1),
            &words(&["apple", "banana", "cherry"]),
            ImpostorMode::Distinct,
            &mut rng,
        )
        .unwrap();
    (store, id)
}

fn playing(n: u64, seed: u64, machine: &PhaseMachine) -> (SessionStore, SessionId) {
    let (mut store, id) = started(n, seed, machine);
    machine.begin_play(store.get_mut(id).unwrap()).unwrap();
    (store, id)
}

fn start_seconds(commands: &[TimerCommand], kind: TimerKind) -> Option<u32> {
    commands.iter().find_map(|c| match c {
        TimerCommand::Start { kind: k, seconds } if *k == kind => Some(*seconds),
        _ => None,
    })
}

fn impostor_count(session: &Session) -> usize {
    session.roles().values().filter(|r| r.is_impostor).count()
}

// =========================================================================
// start
// =========================================================================

#[test]
fn test_start_end_to_end_three_players() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    let mut rng = StdRng::seed_from_u64(42);
    let session = store.get_mut(id).unwrap();

    let timers = machine
        .start(session, conn(1), &words(&["apple", "banana"]), ImpostorMode::Distinct, &mut rng)
        .unwrap();

    assert_eq!(session.phase(), Phase::PreGame);
    assert_eq!(session.pre_game_seconds_left(), 30);
    assert_eq!(start_seconds(&timers, TimerKind::PreGame), Some(30));
    assert_eq!(impostor_count(session), 1);

    let impostor = session.impostor().unwrap();
    let villager_words: HashSet<_> = session
        .roles()
        .iter()
        .filter(|(c, _)| **c != impostor)
        .map(|(_, r)| r.secret_word.clone())
        .collect();
    assert_eq!(villager_words.len(), 1, "the two villagers share one word");
    let villager_word = villager_words.into_iter().next().unwrap();
    assert_ne!(session.role(impostor).unwrap().secret_word, villager_word);

    // Pre-game expiry.
    let order = session.turn_order().to_vec();
    let timers = machine.begin_play(session).unwrap();
    assert_eq!(session.phase(), Phase::Playing);
    assert_eq!(session.current_turn(), Some(order[0]));
    assert_eq!(session.turn_seconds_left(), 80);
    assert_eq!(timers[0], TimerCommand::Cancel(TimerKind::PreGame));
    assert_eq!(start_seconds(&timers, TimerKind::Turn), Some(80));

    // Turn timeout.
    let timers = machine.rotate(session).unwrap();
    assert_eq!(session.current_turn(), Some(order[1]));
    assert_eq!(session.turn_seconds_left(), 80);
    assert_eq!(start_seconds(&timers, TimerKind::Turn), Some(80));
}

#[test]
fn test_start_yields_permutation_and_single_impostor() {
    let machine = PhaseMachine::default();
    for n in 3..=8u64 {
        for seed in 0..40 {
            let (store, id) = started(n, seed, &machine);
            let session = store.get(id).unwrap();

            let mut order = session.turn_order().to_vec();
            order.sort();
            let expected: Vec<_> = (1..=n).map(conn).collect();
            assert_eq!(order, expected);
            assert_eq!(session.roles().len(), n as usize);
            assert_eq!(impostor_count(session), 1);
        }
    }
}

#[test]
fn test_start_distinct_words_differ_over_many_seeds() {
    let machine = PhaseMachine::default();
    for seed in 0..300 {
        let (store, id) = started(4, seed, &machine);
        let session = store.get(id).unwrap();
        let impostor = session.impostor().unwrap();
        let words = session.words().unwrap();
        assert_ne!(words.impostor.as_deref(), Some(words.villager.as_str()));
        assert_eq!(session.role(impostor).unwrap().secret_word, words.impostor);
    }
}

#[test]
fn test_start_wordless_impostor_gets_no_word() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    let session = store.get_mut(id).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    machine
        .start(session, conn(1), &words(&["apple"]), ImpostorMode::Wordless, &mut rng)
        .unwrap();

    let impostor = session.impostor().unwrap();
    assert_eq!(session.role(impostor).unwrap().secret_word, None);
    for (c, role) in session.roles() {
        if *c != impostor {
            assert_eq!(role.secret_word.as_deref(), Some("apple"));
        }
    }
}

#[test]
fn test_start_pre_game_grows_with_players() {
    let machine = PhaseMachine::default();
    let (store, id) = started(6, 1, &machine);
    assert_eq!(store.get(id).unwrap().pre_game_seconds_left(), 45);
}

#[test]
fn test_start_by_non_host_is_rejected() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    let session = store.get_mut(id).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let err = machine
        .start(session, conn(2), &words(&["a"]), ImpostorMode::Wordless, &mut rng)
        .unwrap_err();
    assert_eq!(err, SessionError::NotHost(conn(2)));
    assert_eq!(session.phase(), Phase::Lobby);
    assert!(session.roles().is_empty());
}

#[test]
fn test_start_by_stranger_is_not_member() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    let mut rng = StdRng::seed_from_u64(1);
    let err = machine
        .start(store.get_mut(id).unwrap(), conn(9), &words(&["a"]), ImpostorMode::Wordless, &mut rng)
        .unwrap_err();
    assert_eq!(err, SessionError::NotMember(conn(9)));
}

#[test]
fn test_start_with_too_few_players() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(2);
    let session = store.get_mut(id).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let err = machine
        .start(session, conn(1), &words(&["a"]), ImpostorMode::Wordless, &mut rng)
        .unwrap_err();
    assert_eq!(err, SessionError::TooFewPlayers { have: 2, need: 3 });
    assert_eq!(session.phase(), Phase::Lobby);
}

#[test]
fn test_start_with_empty_word_list() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    let session = store.get_mut(id).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let err = machine
        .start(session, conn(1), &[], ImpostorMode::Distinct, &mut rng)
        .unwrap_err();
    assert_eq!(err, SessionError::InvalidWordList);
    assert_eq!(session.phase(), Phase::Lobby);
    assert!(session.roles().is_empty());
    assert!(session.turn_order().is_empty());
}

#[test]
fn test_start_twice_is_already_started() {
    let machine = PhaseMachine::default();
    let (mut store, id) = started(3, 1, &machine);
    let mut rng = StdRng::seed_from_u64(1);
    let err = machine
        .start(store.get_mut(id).unwrap(), conn(1), &words(&["a"]), ImpostorMode::Wordless, &mut rng)
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyStarted(_)));
}

// =========================================================================
// ready / begin_play / rotate / end_turn
// =========================================================================

#[test]
fn test_ready_by_host_begins_play() {
    let machine = PhaseMachine::default();
    let (mut store, id) = started(5, 2, &machine);
    let session = store.get_mut(id).unwrap();

    let timers = machine.ready(session, conn(1)).unwrap().unwrap();
    assert_eq!(session.phase(), Phase::Playing);
    assert_eq!(start_seconds(&timers, TimerKind::Turn), Some(60));
}

#[test]
fn test_ready_by_non_host_is_rejected() {
    let machine = PhaseMachine::default();
    let (mut store, id) = started(3, 2, &machine);
    let session = store.get_mut(id).unwrap();
    assert_eq!(machine.ready(session, conn(2)), Err(SessionError::NotHost(conn(2))));
    assert_eq!(session.phase(), Phase::PreGame);
}

#[test]
fn test_ready_outside_pre_game_is_noop() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    assert_eq!(machine.ready(store.get_mut(id).unwrap(), conn(1)), Ok(None));

    let (mut store, id) = playing(3, 2, &machine);
    assert_eq!(machine.ready(store.get_mut(id).unwrap(), conn(1)), Ok(None));
}

#[test]
fn test_rotate_outside_playing_is_noop() {
    let machine = PhaseMachine::default();
    let (mut store, id) = started(3, 2, &machine);
    assert_eq!(machine.rotate(store.get_mut(id).unwrap()), None);
}

#[test]
fn test_rotate_shrinks_budget_each_full_round() {
    let machine = PhaseMachine::default();
    let (mut store, id) = playing(4, 3, &machine);
    let session = store.get_mut(id).unwrap();
    assert_eq!(session.turn_seconds_left(), 70);

    let mut budgets = Vec::new();
    for _ in 0..12 {
        machine.rotate(session).unwrap();
        budgets.push(session.turn_seconds_left());
    }
    assert_eq!(
        budgets,
        vec![70, 70, 70, 65, 65, 65, 65, 60, 60, 60, 60, 55]
    );
    assert_eq!(session.round_history()[4].round, 2);
}

#[test]
fn test_rotate_floors_at_thirty() {
    let machine = PhaseMachine::default();
    let (mut store, id) = playing(5, 3, &machine);
    let session = store.get_mut(id).unwrap();
    for _ in 0..200 {
        machine.rotate(session).unwrap();
    }
    assert_eq!(session.turn_seconds_left(), 30);
}

#[test]
fn test_end_turn_by_holder_or_host() {
    let machine = PhaseMachine::default();
    let (mut store, id) = playing(4, 5, &machine);
    let session = store.get_mut(id).unwrap();

    let holder = session.current_turn().unwrap();
    machine.end_turn(session, holder).unwrap().unwrap();
    assert_ne!(session.current_turn(), Some(holder));

    machine.end_turn(session, conn(1)).unwrap().unwrap();
    assert_eq!(session.completed_turns(), 2);
}

#[test]
fn test_end_turn_by_bystander_is_rejected() {
    let machine = PhaseMachine::default();
    let (mut store, id) = playing(4, 5, &machine);
    let session = store.get_mut(id).unwrap();

    let holder = session.current_turn().unwrap();
    let bystander = session
        .turn_order()
        .iter()
        .copied()
        .find(|c| *c != holder && *c != conn(1))
        .unwrap();
    assert_eq!(
        machine.end_turn(session, bystander),
        Err(SessionError::NotYourTurn(bystander))
    );
    assert_eq!(session.current_turn(), Some(holder));
}

#[test]
fn test_end_turn_outside_playing_is_noop() {
    let machine = PhaseMachine::default();
    let (mut store, id) = started(3, 5, &machine);
    assert_eq!(machine.end_turn(store.get_mut(id).unwrap(), conn(2)), Ok(None));
}

// =========================================================================
// end / request_end
// =========================================================================

#[test]
fn test_request_end_returns_to_lobby() {
    let machine = PhaseMachine::default();
    let (mut store, id) = playing(3, 8, &machine);
    let session = store.get_mut(id).unwrap();

    let timers = machine.request_end(session, conn(3)).unwrap().unwrap();
    assert_eq!(timers, vec![TimerCommand::CancelAll]);
    assert_eq!(session.phase(), Phase::Lobby);
    assert!(session.roles().is_empty());
    assert!(session.turn_order().is_empty());
    assert_eq!(session.current_turn(), None);
}

#[test]
fn test_request_end_in_lobby_is_noop() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    assert_eq!(machine.request_end(store.get_mut(id).unwrap(), conn(2)), Ok(None));
}

#[test]
fn test_request_end_by_stranger_is_not_member() {
    let machine = PhaseMachine::default();
    let (mut store, id) = playing(3, 8, &machine);
    let session = store.get_mut(id).unwrap();
    assert_eq!(machine.request_end(session, conn(9)), Err(SessionError::NotMember(conn(9))));
    assert_eq!(session.phase(), Phase::Playing);
}

#[test]
fn test_session_can_start_again_after_end() {
    let machine = PhaseMachine::default();
    let (mut store, id) = playing(3, 8, &machine);
    let session = store.get_mut(id).unwrap();
    machine.end(session, EndReason::Requested).unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    machine
        .start(session, conn(1), &words(&["x", "y"]), ImpostorMode::Distinct, &mut rng)
        .unwrap();
    assert_eq!(session.phase(), Phase::PreGame);
    assert_eq!(session.completed_turns(), 0);
}

// =========================================================================
// depart
// =========================================================================

#[test]
fn test_depart_below_minimum_aborts_round() {
    let machine = PhaseMachine::default();
    for seed in 0..20 {
        let (mut store, id) = playing(3, seed, &machine);
        let session = store.get_mut(id).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);

        let departure = machine.depart(session, conn(2), &mut rng).unwrap();
        assert_eq!(departure.effect, DepartureEffect::RoundAborted);
        assert_eq!(departure.timers, vec![TimerCommand::CancelAll]);
        assert_eq!(session.phase(), Phase::Lobby);
        assert!(session.roles().is_empty());
        assert!(session.turn_order().is_empty());
    }
}

#[test]
fn test_depart_in_lobby_only_touches_roster() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(2);
    let session = store.get_mut(id).unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let departure = machine.depart(session, conn(1), &mut rng).unwrap();
    assert_eq!(departure.effect, DepartureEffect::RosterOnly);
    assert_eq!(departure.removal.new_host, Some(conn(2)));
    assert!(departure.timers.is_empty());
}

#[test]
fn test_depart_last_player_empties_session() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(1);
    let mut rng = StdRng::seed_from_u64(0);
    let departure = machine.depart(store.get_mut(id).unwrap(), conn(1), &mut rng).unwrap();
    assert_eq!(departure.effect, DepartureEffect::SessionEmptied);
    assert_eq!(departure.timers, vec![TimerCommand::CancelAll]);
}

#[test]
fn test_depart_unknown_is_not_member() {
    let machine = PhaseMachine::default();
    let (mut store, id) = lobby(3);
    let mut rng = StdRng::seed_from_u64(0);
    let err = machine.depart(store.get_mut(id).unwrap(), conn(9), &mut rng).unwrap_err();
    assert_eq!(err, SessionError::NotMember(conn(9)));
}

#[test]
fn test_depart_active_holder_passes_turn_with_fresh_countdown() {
    let machine = PhaseMachine::default();
    for seed in 0..20 {
        let (mut store, id) = playing(5, seed, &machine);
        let session = store.get_mut(id).unwrap();
        for _ in 0..5 {
            machine.rotate(session).unwrap();
        }
        session.set_turn_seconds_left(3);
        let holder = session.current_turn().unwrap();
        let mut rng = StdRng::seed_from_u64(seed);

        let departure = machine.depart(session, holder, &mut rng).unwrap();
        let DepartureEffect::TurnPassed { next } = departure.effect else {
            panic!("expected TurnPassed, got {:?}", departure.effect);
        };
        assert_eq!(session.current_turn(), Some(next));
        assert!(session.contains(next));
        // Base 60, 5 completed turns over 4 remaining players: one full round.
        assert_eq!(session.turn_seconds_left(), 55);
        assert_eq!(start_seconds(&departure.timers, TimerKind::Turn), Some(55));
    }
}

#[test]
fn test_depart_impostor_keeps_round_by_default() {
    let machine = PhaseMachine::default();
    let (mut store, id) = started(4, 11, &machine);
    let session = store.get_mut(id).unwrap();
    let impostor = session.impostor().unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let departure = machine.depart(session, impostor, &mut rng).unwrap();
    assert!(departure.removal.was_impostor);
    assert_eq!(departure.effect, DepartureEffect::RosterOnly);
    assert_eq!(session.impostor(), None);
    assert_eq!(session.phase(), Phase::PreGame);
}

#[test]
fn test_depart_impostor_rerolls_when_configured() {
    let machine = PhaseMachine::new(GameRules {
        impostor_departure: ImpostorDeparture::Reroll,
        ..GameRules::default()
    });
    for seed in 0..20 {
        let (mut store, id) = started(4, seed, &machine);
        let session = store.get_mut(id).unwrap();
        let impostor = session.impostor().unwrap();
        let villager_word = session.words().unwrap().villager.clone();
        let mut rng = StdRng::seed_from_u64(seed);

        let departure = machine.depart(session, impostor, &mut rng).unwrap();
        let DepartureEffect::ImpostorRerolled { impostor: new } = departure.effect else {
            panic!("expected ImpostorRerolled, got {:?}", departure.effect);
        };
        assert_ne!(new, impostor);
        assert_eq!(session.impostor(), Some(new));
        assert_eq!(impostor_count(session), 1);
        assert_eq!(session.roles().len(), 3);
        assert_eq!(session.words().unwrap().villager, villager_word);
    }
}

#[test]
fn test_depart_impostor_during_play_never_rerolls() {
    let machine = PhaseMachine::new(GameRules {
        impostor_departure: ImpostorDeparture::Reroll,
        ..GameRules::default()
    });
    let (mut store, id) = playing(5, 4, &machine);
    let session = store.get_mut(id).unwrap();
    let impostor = session.impostor().unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let departure = machine.depart(session, impostor, &mut rng).unwrap();
    assert!(!matches!(departure.effect, DepartureEffect::ImpostorRerolled { .. }));
    assert_eq!(session.impostor(), None);
}
