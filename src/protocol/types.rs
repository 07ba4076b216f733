use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Database identity of a player. Room codes key everything else.
pub type UserId = i64;

/// Score table broadcast with round and game envelopes.
///
/// serde_json writes integer keys as strings on the wire and parses them
/// back, which matches the stored JSON layout.
pub type Scores = HashMap<UserId, i64>;

/// Player identity as exposed to other clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: UserId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Lifecycle of a room's game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Waiting,
    Running,
    Finished,
}

impl GameStatus {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEndReason {
    Time,
    AllGuessed,
}

/// One row of the lobby room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyRoom {
    pub code: String,
    pub active_count: u32,
    pub max_players: u32,
    pub is_full: bool,
    pub is_private: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GameStatus::Waiting).unwrap(),
            "\"waiting\""
        );
        assert_eq!(
            serde_json::to_string(&GameStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&GameStatus::Finished).unwrap(),
            "\"finished\""
        );
    }

    #[test]
    fn test_round_end_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&RoundEndReason::Time).unwrap(),
            "\"time\""
        );
        assert_eq!(
            serde_json::to_string(&RoundEndReason::AllGuessed).unwrap(),
            "\"all_guessed\""
        );
    }

    #[test]
    fn test_scores_round_trip_integer_keys() {
        let mut scores = Scores::new();
        scores.insert(7, 120);
        scores.insert(42, 0);

        let json = serde_json::to_string(&scores).unwrap();
        assert!(json.contains("\"7\":120"));

        let back: Scores = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scores);
    }
}
