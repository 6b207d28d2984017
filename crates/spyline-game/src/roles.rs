//! Random draws at game start: the words, the impostor, the turn order.

use rand::Rng;
use rand::seq::SliceRandom;
use spyline_protocol::{ConnectionId, ImpostorMode};
use spyline_session::{Player, RoundWords, SessionError};

/// Picks the villager word, and in [`ImpostorMode::Distinct`] a different
/// impostor word, uniformly from the non-blank entries of `words`.
///
/// The impostor word falls back to the villager word only when every
/// usable entry is the same.
///
/// # Errors
/// [`SessionError::InvalidWordList`] if no entry has visible content.
pub fn draw_words<R: Rng + ?Sized>(
    words: &[String],
    mode: ImpostorMode,
    rng: &mut R,
) -> Result<RoundWords, SessionError> {
    let candidates: Vec<&str> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .collect();
    if candidates.is_empty() {
        return Err(SessionError::InvalidWordList);
    }

    let villager = candidates[rng.random_range(0..candidates.len())];
    let impostor = match mode {
        ImpostorMode::Wordless => None,
        ImpostorMode::Distinct => {
            let others: Vec<&str> = candidates.iter().copied().filter(|w| *w != villager).collect();
            if others.is_empty() {
                Some(villager.to_owned())
            } else {
                Some(others[rng.random_range(0..others.len())].to_owned())
            }
        }
    };

    Ok(RoundWords {
        villager: villager.to_owned(),
        impostor,
    })
}

/// Picks one player uniformly. `None` only for an empty roster.
pub fn draw_impostor<R: Rng + ?Sized>(players: &[Player], rng: &mut R) -> Option<ConnectionId> {
    if players.is_empty() {
        return None;
    }
    Some(players[rng.random_range(0..players.len())].connection_id)
}

/// A uniformly random permutation of the roster (Fisher–Yates).
pub fn shuffled_turn_order<R: Rng + ?Sized>(players: &[Player], rng: &mut R) -> Vec<ConnectionId> {
    let mut order: Vec<ConnectionId> = players.iter().map(|p| p.connection_id).collect();
    order.shuffle(rng);
    order
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    fn players(n: u64) -> Vec<Player> {
        (1..=n)
            .map(|id| Player {
                connection_id: ConnectionId::new(id),
                name: format!("P{id}"),
            })
            .collect()
    }

    #[test]
    fn test_draw_words_rejects_empty_list() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = draw_words(&[], ImpostorMode::Wordless, &mut rng).unwrap_err();
        assert_eq!(err, SessionError::InvalidWordList);
    }

    #[test]
    fn test_draw_words_rejects_blank_entries() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = draw_words(&words(&["", "   "]), ImpostorMode::Distinct, &mut rng).unwrap_err();
        assert_eq!(err, SessionError::InvalidWordList);
    }

    #[test]
    fn test_draw_words_skips_blank_entries() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let drawn = draw_words(&words(&["", "pear", " "]), ImpostorMode::Wordless, &mut rng).unwrap();
            assert_eq!(drawn.villager, "pear");
            assert_eq!(drawn.impostor, None);
        }
    }

    #[test]
    fn test_draw_words_distinct_never_repeats_villager_word() {
        let list = words(&["apple", "banana", "cherry"]);
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let drawn = draw_words(&list, ImpostorMode::Distinct, &mut rng).unwrap();
            assert_ne!(Some(drawn.villager.as_str()), drawn.impostor.as_deref());
        }
    }

    #[test]
    fn test_draw_words_distinct_single_word_is_shared() {
        let mut rng = StdRng::seed_from_u64(3);
        let drawn = draw_words(&words(&["solo"]), ImpostorMode::Distinct, &mut rng).unwrap();
        assert_eq!(drawn.villager, "solo");
        assert_eq!(drawn.impostor.as_deref(), Some("solo"));
    }

    #[test]
    fn test_draw_words_covers_every_entry() {
        let list = words(&["a", "b", "c", "d"]);
        let seen: HashSet<String> = (0..200)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                draw_words(&list, ImpostorMode::Wordless, &mut rng).unwrap().villager
            })
            .collect();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_draw_impostor_is_a_player() {
        let roster = players(5);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let chosen = draw_impostor(&roster, &mut rng).unwrap();
            assert!(roster.iter().any(|p| p.connection_id == chosen));
        }
        assert_eq!(draw_impostor(&[], &mut rng), None);
    }

    #[test]
    fn test_shuffled_turn_order_is_permutation() {
        let roster = players(6);
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut order = shuffled_turn_order(&roster, &mut rng);
            assert_eq!(order.len(), 6);
            order.sort();
            let expected: Vec<_> = roster.iter().map(|p| p.connection_id).collect();
            assert_eq!(order, expected);
        }
    }
}
