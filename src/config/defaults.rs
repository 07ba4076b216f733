//! Default value functions for configuration fields, used by serde's
//! `#[serde(default = ...)]` attributes.

use super::logging::LogFormat;

// =============================================================================
// Root
// =============================================================================

pub const fn default_port() -> u16 {
    8430
}

pub fn default_cors_origins() -> String {
    "*".to_string()
}

// =============================================================================
// Game
// =============================================================================

pub const fn default_round_seconds() -> u64 {
    120
}

pub const fn default_max_rounds() -> u32 {
    10
}

pub const fn default_max_players() -> u32 {
    8
}

pub const fn default_chat_window_seconds() -> u64 {
    4
}

pub const fn default_chat_max_burst() -> usize {
    3
}

pub const fn default_max_chat_cooldown() -> u64 {
    12
}

pub const fn default_disconnect_grace_seconds() -> u64 {
    60
}

pub const fn default_round_break_seconds() -> u64 {
    5
}

pub const fn default_kick_vote_seconds() -> u64 {
    20
}

pub const fn default_chat_history_limit() -> usize {
    500
}

pub const fn default_draw_history_limit() -> usize {
    2000
}

// =============================================================================
// Storage
// =============================================================================

pub const fn default_room_state_ttl_seconds() -> u64 {
    86_400 // 1 day
}

pub const fn default_room_history_ttl_seconds() -> u64 {
    604_800 // 7 days
}

pub const fn default_timer_owner_grace_seconds() -> u64 {
    15
}

pub const fn default_lock_timeout_seconds() -> u64 {
    10
}

pub const fn default_lock_wait_seconds() -> u64 {
    5
}

// =============================================================================
// Auth
// =============================================================================

pub fn default_access_cookie() -> String {
    "access_token".to_string()
}

// =============================================================================
// Logging
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Text
}
