//! Persistence gateway: the relational rows the engine reads and the two
//! writes it is allowed to make.
//!
//! Rooms and memberships are created by the HTTP API; the engine only reads
//! them, flips members inactive, and keeps `empty_since` in sync. Everything
//! is behind a trait so tests and single-box deployments run on the
//! in-memory implementation.

pub mod memory;

pub use memory::InMemoryGateway;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::protocol::{LobbyRoom, PublicUser, UserId};

/// Hard cap on concurrently active members per room.
pub const MAX_PLAYERS: u32 = 8;

/// A room row. `empty_since` is set exactly while the room has zero active
/// members; the maintenance job uses it to reap abandoned rooms.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: i64,
    pub code: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_private: bool,
    pub empty_since: Option<DateTime<Utc>>,
}

/// Membership row, unique per `(room, user)`.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub room_id: i64,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Storage operations the room engine depends on.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Fetch a room by code, only if it is still active.
    async fn get_active_room(&self, code: &str) -> Result<Option<Room>>;

    async fn is_member_active(&self, room_id: i64, user_id: UserId) -> Result<bool>;

    /// Active members of a room in join order.
    async fn list_active_members(&self, room_id: i64) -> Result<Vec<PublicUser>>;

    /// Active member ids of a room looked up by code. Empty for unknown or
    /// inactive rooms.
    async fn list_active_member_ids(&self, code: &str) -> Result<Vec<UserId>>;

    async fn mark_member_inactive(&self, room_id: i64, user_id: UserId) -> Result<()>;

    /// Set or clear `empty_since` according to the live member count.
    /// Returns `true` iff the room is now empty.
    async fn sync_empty_since(&self, room_id: i64) -> Result<bool>;

    /// Whether a user may hold a socket at all: not banned, not soft-deleted,
    /// and with a non-empty display name.
    async fn is_user_allowed(&self, user_id: UserId) -> Result<bool>;

    async fn get_public_user(&self, user_id: UserId) -> Result<Option<PublicUser>>;

    /// Session id of the user's single active session, for pinning bearer
    /// tokens to the latest login.
    async fn active_session_id(&self, user_id: UserId) -> Result<Option<String>>;

    /// Lobby listing of active rooms, newest first.
    async fn rooms_snapshot(&self) -> Result<Vec<LobbyRoom>>;
}
