//! Game pacing and room behavior configuration.

use super::defaults::{
    default_chat_history_limit, default_chat_max_burst, default_chat_window_seconds,
    default_disconnect_grace_seconds, default_draw_history_limit, default_kick_vote_seconds,
    default_max_chat_cooldown, default_max_players, default_max_rounds,
    default_round_break_seconds, default_round_seconds,
};
use serde::{Deserialize, Serialize};

/// Everything that shapes a room's game: round pacing, chat throttling,
/// disconnect grace, kick voting, and history retention.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GameConfig {
    /// Seconds each drawing round lasts
    #[serde(default = "default_round_seconds")]
    pub round_seconds: u64,
    /// Rounds per game
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Maximum concurrently active members per room
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// Sliding window for the chat burst limiter (seconds)
    #[serde(default = "default_chat_window_seconds")]
    pub chat_window_seconds: u64,
    /// Messages allowed inside one window before a cooldown kicks in
    #[serde(default = "default_chat_max_burst")]
    pub chat_max_burst: usize,
    /// Ceiling for the escalating chat cooldown (seconds)
    #[serde(default = "default_max_chat_cooldown")]
    pub max_chat_cooldown: u64,
    /// How long a fully disconnected player stays a member (seconds)
    #[serde(default = "default_disconnect_grace_seconds")]
    pub disconnect_grace_seconds: u64,
    /// Pause between rounds (seconds)
    #[serde(default = "default_round_break_seconds")]
    pub round_break_seconds: u64,
    /// How long a kick vote stays open (seconds)
    #[serde(default = "default_kick_vote_seconds")]
    pub kick_vote_seconds: u64,
    /// Chat replay entries kept per room
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
    /// Canvas stroke entries kept per room
    #[serde(default = "default_draw_history_limit")]
    pub draw_history_limit: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_seconds: default_round_seconds(),
            max_rounds: default_max_rounds(),
            max_players: default_max_players(),
            chat_window_seconds: default_chat_window_seconds(),
            chat_max_burst: default_chat_max_burst(),
            max_chat_cooldown: default_max_chat_cooldown(),
            disconnect_grace_seconds: default_disconnect_grace_seconds(),
            round_break_seconds: default_round_break_seconds(),
            kick_vote_seconds: default_kick_vote_seconds(),
            chat_history_limit: default_chat_history_limit(),
            draw_history_limit: default_draw_history_limit(),
        }
    }
}
