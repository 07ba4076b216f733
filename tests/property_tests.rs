//! Property-based coverage of masking, hint reveals, quorum-free state
//! serialization, and countdown arithmetic.

use std::collections::BTreeSet;

use proptest::prelude::*;

use sketchparty_server::config::GameConfig;
use sketchparty_server::protocol::GameStatus;
use sketchparty_server::state::GameState;
use sketchparty_server::words::{hint_candidates, mask_word, reveal_one, WORDS};

fn arb_word() -> impl Strategy<Value = &'static str> {
    (0..WORDS.len()).prop_map(|idx| WORDS[idx])
}

proptest! {
    /// Masked rendering is idempotent: re-rendering with the same revealed
    /// set yields the same string.
    #[test]
    fn prop_masking_idempotent(word in arb_word(), seed in any::<u64>()) {
        let mut revealed = BTreeSet::new();
        for _ in 0..(seed % 5) {
            reveal_one(word, &mut revealed);
        }
        let first = mask_word(word, &revealed);
        let second = mask_word(word, &revealed);
        prop_assert_eq!(first, second);
    }

    /// Reveals only ever touch non-space positions and grow monotonically.
    #[test]
    fn prop_reveals_subset_of_letters(word in arb_word(), rounds in 0usize..20) {
        let mut revealed = BTreeSet::new();
        let mut last_len = 0;
        let letters: BTreeSet<usize> = word
            .chars()
            .enumerate()
            .filter(|(_, c)| *c != ' ')
            .map(|(i, _)| i)
            .collect();
        for _ in 0..rounds {
            reveal_one(word, &mut revealed);
            prop_assert!(revealed.is_subset(&letters));
            prop_assert!(revealed.len() >= last_len);
            last_len = revealed.len();
        }
    }

    /// The mask always has one rendered position per character and exposes
    /// exactly the revealed letters.
    #[test]
    fn prop_mask_shape(word in arb_word(), revealed in any::<u64>()) {
        let mut set = BTreeSet::new();
        for _ in 0..(revealed % 7) {
            reveal_one(word, &mut set);
        }
        let masked = mask_word(word, &set);
        let positions: Vec<char> = masked.chars().step_by(2).collect();
        prop_assert_eq!(positions.len(), word.chars().count());

        let letters = positions.iter().filter(|c| c.is_alphabetic()).count();
        prop_assert_eq!(letters, set.len());

        let blanks = positions.iter().filter(|c| **c == '_').count();
        let spaces = word.chars().filter(|c| *c == ' ').count();
        prop_assert_eq!(blanks + spaces + set.len(), word.chars().count());
    }

    /// Candidates never include spaces or already-revealed positions.
    #[test]
    fn prop_candidates_disjoint_from_revealed(word in arb_word()) {
        let strategy_input = word;
        let mut revealed = BTreeSet::new();
        reveal_one(strategy_input, &mut revealed);
        let candidates = hint_candidates(strategy_input, &revealed);
        for idx in &candidates {
            prop_assert!(!revealed.contains(idx));
            prop_assert_ne!(strategy_input.as_bytes()[*idx], b' ');
        }
    }
}

fn arb_game_state() -> impl Strategy<Value = GameState> {
    (
        prop_oneof![
            Just(GameStatus::Waiting),
            Just(GameStatus::Running),
            Just(GameStatus::Finished)
        ],
        0u32..=10,
        proptest::option::of(1i64..100),
        proptest::option::of(arb_word()),
        proptest::collection::hash_map(1i64..100, 0i64..5000, 0..8),
        proptest::collection::btree_set(1i64..100, 0..8),
        proptest::collection::btree_set(0usize..16, 0..8),
        proptest::collection::hash_map(
            1i64..100,
            proptest::collection::btree_set(1i64..100, 0..8),
            0..3,
        ),
    )
        .prop_map(
            |(status, round_index, drawer, word, scores, guessed, revealed, votes)| {
                let mut state = GameState::new(&GameConfig::default());
                state.status = status;
                state.round_index = round_index;
                state.drawer_id = drawer;
                state.last_drawer_id = drawer;
                state.word = word.map(str::to_string);
                state.scores = scores;
                state.guessed = guessed;
                state.revealed_indices = revealed;
                state.kick_votes = votes.clone();
                state.kick_responses = votes;
                state.started_at = 1_700_000_000.0 + f64::from(round_index);
                state
            },
        )
}

proptest! {
    /// Serializing through the KV representation preserves every field:
    /// sets by value, integer-keyed maps by key and value.
    #[test]
    fn prop_game_state_round_trip(state in arb_game_state()) {
        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.status, state.status);
        prop_assert_eq!(back.round_index, state.round_index);
        prop_assert_eq!(back.max_rounds, state.max_rounds);
        prop_assert_eq!(back.round_seconds, state.round_seconds);
        prop_assert_eq!(back.drawer_id, state.drawer_id);
        prop_assert_eq!(back.word, state.word);
        prop_assert_eq!(back.scores, state.scores);
        prop_assert_eq!(back.guessed, state.guessed);
        prop_assert_eq!(back.revealed_indices, state.revealed_indices);
        prop_assert_eq!(back.kick_votes, state.kick_votes);
        prop_assert_eq!(back.kick_responses, state.kick_responses);
        prop_assert_eq!(back.started_at, state.started_at);
    }

    /// The countdown never exceeds the round length and reaches zero.
    #[test]
    fn prop_seconds_left_bounded(elapsed in 0f64..10_000.0) {
        let mut state = GameState::new(&GameConfig::default());
        state.started_at = 1_000_000.0;
        let left = state.seconds_left(state.started_at + elapsed);
        prop_assert!(left <= state.round_seconds);
        if elapsed >= state.round_seconds as f64 + 1.0 {
            prop_assert_eq!(left, 0);
        }
    }
}
