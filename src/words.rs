//! The drawing dictionary and word-masking rules.

use std::collections::BTreeSet;

use rand::RngExt;

/// Words and short phrases a drawer can be assigned. Sampled uniformly at
/// random each round.
pub const WORDS: &[&str] = &[
    "tree",
    "house",
    "river",
    "mountain",
    "phone",
    "pencil",
    "laptop",
    "camera",
    "bridge",
    "bicycle",
    "guitar",
    "pizza",
    "football",
    "rocket",
    "car",
    "elephant",
    "flower",
    "sun",
    "moon",
    "cloud",
    "boat",
    "castle",
    "train",
    "airplane",
    "robot",
    "glasses",
    "clock",
    "coffee",
    "chair",
    "table",
    "book",
    "banana",
    "apple",
    "shoes",
    "umbrella",
    "window",
    "key",
    "pizza slice",
    "snowman",
    "ice cream",
    "tree house",
    "volcano",
    "light bulb",
    "backpack",
    "telescope",
    "horse",
    "lion",
    "tiger",
    "owl",
    "cat",
    "dog",
    "spider",
    "road",
    "candle",
    "campfire",
    "cup",
    "hat",
    "ring",
    "watch",
    "map",
    "star",
    "planet",
    "sandcastle",
    "waterfall",
    "kite",
    "panda",
    "snowflake",
    "flower pot",
    "drum",
    "microphone",
    "headphones",
    "sunglasses",
    "rainbow",
    "tree trunk",
    "chocolate",
    "burger",
    "diamond",
    "tower",
    "pyramid",
    "paintbrush",
    "palmtree",
    "fish",
    "whale",
    "shark",
    "submarine",
    "hot air balloon",
    "camera lens",
    "mountain peak",
];

/// Pick the secret word for a new round.
pub fn pick_word() -> &'static str {
    let mut rng = rand::rng();
    let idx = rng.random_range(0..WORDS.len());
    // SAFETY: `idx` is produced by `random_range(0..len)`, so it is always
    // within [0, len).
    #[allow(clippy::indexing_slicing)]
    let word = WORDS[idx];
    word
}

/// Render the word as guessers see it: spaces survive, revealed positions
/// show the uppercased letter, everything else is an underscore, and the
/// positions are joined with single spaces.
pub fn mask_word(word: &str, revealed: &BTreeSet<usize>) -> String {
    let rendered: Vec<String> = word
        .chars()
        .enumerate()
        .map(|(idx, ch)| {
            if ch == ' ' {
                " ".to_string()
            } else if revealed.contains(&idx) {
                ch.to_uppercase().to_string()
            } else {
                "_".to_string()
            }
        })
        .collect();
    rendered.join(" ")
}

/// Positions that a hint may still reveal: non-space and not yet revealed.
pub fn hint_candidates(word: &str, revealed: &BTreeSet<usize>) -> Vec<usize> {
    word.chars()
        .enumerate()
        .filter(|(idx, ch)| *ch != ' ' && !revealed.contains(idx))
        .map(|(idx, _)| idx)
        .collect()
}

/// Reveal one more letter position, chosen uniformly from the remaining
/// candidates. No-op once every letter is exposed.
pub fn reveal_one(word: &str, revealed: &mut BTreeSet<usize>) {
    let candidates = hint_candidates(word, revealed);
    if candidates.is_empty() {
        return;
    }
    let mut rng = rand::rng();
    let idx = rng.random_range(0..candidates.len());
    // SAFETY: `idx` is produced by `random_range(0..len)`, so it is always
    // within [0, len).
    #[allow(clippy::indexing_slicing)]
    revealed.insert(candidates[idx]);
}

/// Countdown values (seconds left) at which a hint letter is revealed.
pub const HINT_MARKS: [u64; 3] = [90, 60, 30];

/// Whether the timer should reveal a hint at this tick.
pub fn is_hint_mark(seconds_left: u64) -> bool {
    HINT_MARKS.contains(&seconds_left)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_everything_initially() {
        let revealed = BTreeSet::new();
        assert_eq!(mask_word("apple", &revealed), "_ _ _ _ _");
    }

    #[test]
    fn test_mask_preserves_spaces_and_uppercases_reveals() {
        let revealed: BTreeSet<usize> = [0, 6].into_iter().collect();
        // "pizza slice": index 5 is the space, 6 the first letter of "slice".
        assert_eq!(mask_word("pizza slice", &revealed), "P _ _ _ _   S _ _ _ _");
    }

    #[test]
    fn test_mask_is_idempotent_for_same_reveals() {
        let revealed: BTreeSet<usize> = [1, 3].into_iter().collect();
        let first = mask_word("house", &revealed);
        let second = mask_word("house", &revealed);
        assert_eq!(first, second);
    }

    #[test]
    fn test_candidates_exclude_spaces_and_revealed() {
        let mut revealed = BTreeSet::new();
        revealed.insert(0);
        let candidates = hint_candidates("ice cream", &revealed);
        assert!(!candidates.contains(&0));
        assert!(!candidates.contains(&3)); // the space
        assert_eq!(candidates.len(), "ice cream".len() - 2);
    }

    #[test]
    fn test_reveal_one_grows_until_exhausted() {
        let word = "house";
        let mut revealed = BTreeSet::new();
        for expected in 1..=word.len() {
            reveal_one(word, &mut revealed);
            assert_eq!(revealed.len(), expected);
        }
        // Every position exposed: further reveals are no-ops.
        reveal_one(word, &mut revealed);
        assert_eq!(revealed.len(), word.len());
        assert!(revealed.iter().all(|idx| *idx < word.len()));
    }

    #[test]
    fn test_reveal_never_picks_spaces() {
        let word = "hot air balloon";
        let mut revealed = BTreeSet::new();
        for _ in 0..word.len() {
            reveal_one(word, &mut revealed);
        }
        let spaces: Vec<usize> = word
            .chars()
            .enumerate()
            .filter(|(_, c)| *c == ' ')
            .map(|(i, _)| i)
            .collect();
        for space in spaces {
            assert!(!revealed.contains(&space));
        }
    }

    #[test]
    fn test_three_hints_leave_two_blanks_in_house() {
        let word = "house";
        let mut revealed = BTreeSet::new();
        for _ in 0..3 {
            reveal_one(word, &mut revealed);
        }
        assert_eq!(revealed.len(), 3);
        let masked = mask_word(word, &revealed);
        let blanks = masked.chars().filter(|c| *c == '_').count();
        let letters = masked.chars().filter(|c| c.is_alphabetic()).count();
        assert_eq!(blanks, 2);
        assert_eq!(letters, 3);
    }

    #[test]
    fn test_hint_marks() {
        assert!(is_hint_mark(90));
        assert!(is_hint_mark(60));
        assert!(is_hint_mark(30));
        assert!(!is_hint_mark(120));
        assert!(!is_hint_mark(0));
        assert!(!is_hint_mark(29));
    }

    #[test]
    fn test_dictionary_is_usable() {
        assert!(WORDS.len() >= 80);
        assert!(WORDS.iter().all(|w| !w.trim().is_empty()));
        for _ in 0..32 {
            assert!(WORDS.contains(&pick_word()));
        }
    }
}
