//! Shared-store key lifetimes and distributed lock tuning.

use super::defaults::{
    default_lock_timeout_seconds, default_lock_wait_seconds, default_room_history_ttl_seconds,
    default_room_state_ttl_seconds, default_timer_owner_grace_seconds,
};
use serde::{Deserialize, Serialize};

/// TTLs and lock parameters for the `room:{CODE}:*` key family.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Lifetime of the serialized game state key (seconds)
    #[serde(default = "default_room_state_ttl_seconds")]
    pub room_state_ttl_seconds: u64,
    /// Lifetime of the chat and draw history lists (seconds)
    #[serde(default = "default_room_history_ttl_seconds")]
    pub room_history_ttl_seconds: u64,
    /// Slack added to the round length for the timer-owner key TTL (seconds)
    #[serde(default = "default_timer_owner_grace_seconds")]
    pub timer_owner_grace_seconds: u64,
    /// Auto-expiry of the per-room distributed mutex (seconds)
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
    /// How long a contender blocks waiting for the mutex (seconds)
    #[serde(default = "default_lock_wait_seconds")]
    pub lock_wait_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            room_state_ttl_seconds: default_room_state_ttl_seconds(),
            room_history_ttl_seconds: default_room_history_ttl_seconds(),
            timer_owner_grace_seconds: default_timer_owner_grace_seconds(),
            lock_timeout_seconds: default_lock_timeout_seconds(),
            lock_wait_seconds: default_lock_wait_seconds(),
        }
    }
}
