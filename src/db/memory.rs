//! In-memory [`PersistenceGateway`] used by tests and single-box runs.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::protocol::{LobbyRoom, PublicUser, UserId};

use super::{PersistenceGateway, Room, RoomMember, MAX_PLAYERS};

#[derive(Debug, Clone)]
struct UserRecord {
    public: PublicUser,
    is_banned: bool,
    is_deleted: bool,
    session_id: Option<String>,
}

#[derive(Default)]
struct Inner {
    rooms: Vec<Room>,
    members: Vec<RoomMember>,
    users: HashMap<UserId, UserRecord>,
    next_room_id: i64,
}

/// Gateway backed by plain vectors behind an `RwLock`. The mutating test
/// helpers mirror what the HTTP API does in production.
#[derive(Default)]
pub struct InMemoryGateway {
    inner: RwLock<Inner>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a display name and an active session.
    pub fn add_user(&self, id: UserId, name: &str, session_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.users.insert(
            id,
            UserRecord {
                public: PublicUser {
                    id,
                    name: name.to_string(),
                    avatar: None,
                },
                is_banned: false,
                is_deleted: false,
                session_id: Some(session_id.to_string()),
            },
        );
    }

    pub fn ban_user(&self, id: UserId) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(user) = inner.users.get_mut(&id) {
            user.is_banned = true;
        }
    }

    /// Create an active room and return its id.
    pub fn add_room(&self, code: &str, owner_id: UserId, is_private: bool) -> i64 {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.next_room_id += 1;
        let id = inner.next_room_id;
        inner.rooms.push(Room {
            id,
            code: code.to_string(),
            owner_id,
            created_at: Utc::now(),
            is_active: true,
            is_private,
            empty_since: None,
        });
        id
    }

    /// Activate a membership the way the HTTP join endpoint does. Fails
    /// closed when the room is full.
    pub fn join_room(&self, room_id: i64, user_id: UserId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let active = inner
            .members
            .iter()
            .filter(|m| m.room_id == room_id && m.is_active)
            .count() as u32;
        if let Some(member) = inner
            .members
            .iter_mut()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
        {
            if !member.is_active {
                if active >= MAX_PLAYERS {
                    return false;
                }
                member.is_active = true;
            }
            return true;
        }
        if active >= MAX_PLAYERS {
            return false;
        }
        inner.members.push(RoomMember {
            room_id,
            user_id,
            joined_at: Utc::now(),
            is_active: true,
        });
        true
    }

    pub fn deactivate_room(&self, room_id: i64) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(room) = inner.rooms.iter_mut().find(|r| r.id == room_id) {
            room.is_active = false;
        }
    }

    pub fn empty_since(&self, room_id: i64) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .and_then(|r| r.empty_since)
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn get_active_room(&self, code: &str) -> Result<Option<Room>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .rooms
            .iter()
            .find(|r| r.code == code && r.is_active)
            .cloned())
    }

    async fn is_member_active(&self, room_id: i64, user_id: UserId) -> Result<bool> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .members
            .iter()
            .any(|m| m.room_id == room_id && m.user_id == user_id && m.is_active))
    }

    async fn list_active_members(&self, room_id: i64) -> Result<Vec<PublicUser>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut members: Vec<&RoomMember> = inner
            .members
            .iter()
            .filter(|m| m.room_id == room_id && m.is_active)
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members
            .iter()
            .filter_map(|m| inner.users.get(&m.user_id))
            .map(|u| u.public.clone())
            .collect())
    }

    async fn list_active_member_ids(&self, code: &str) -> Result<Vec<UserId>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let Some(room) = inner.rooms.iter().find(|r| r.code == code && r.is_active) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<&RoomMember> = inner
            .members
            .iter()
            .filter(|m| m.room_id == room.id && m.is_active)
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members.iter().map(|m| m.user_id).collect())
    }

    async fn mark_member_inactive(&self, room_id: i64, user_id: UserId) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(member) = inner
            .members
            .iter_mut()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
        {
            member.is_active = false;
        }
        Ok(())
    }

    async fn sync_empty_since(&self, room_id: i64) -> Result<bool> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let active = inner
            .members
            .iter()
            .any(|m| m.room_id == room_id && m.is_active);
        let Some(room) = inner
            .rooms
            .iter_mut()
            .find(|r| r.id == room_id && r.is_active)
        else {
            return Ok(false);
        };
        if active {
            room.empty_since = None;
            Ok(false)
        } else {
            if room.empty_since.is_none() {
                room.empty_since = Some(Utc::now());
            }
            Ok(true)
        }
    }

    async fn is_user_allowed(&self, user_id: UserId) -> Result<bool> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner.users.get(&user_id).is_some_and(|u| {
            !u.is_banned && !u.is_deleted && !u.public.name.trim().is_empty()
        }))
    }

    async fn get_public_user(&self, user_id: UserId) -> Result<Option<PublicUser>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner.users.get(&user_id).map(|u| u.public.clone()))
    }

    async fn active_session_id(&self, user_id: UserId) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .users
            .get(&user_id)
            .and_then(|u| u.session_id.clone()))
    }

    async fn rooms_snapshot(&self) -> Result<Vec<LobbyRoom>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut rooms: Vec<&Room> = inner.rooms.iter().filter(|r| r.is_active).collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms
            .iter()
            .map(|room| {
                let active_count = inner
                    .members
                    .iter()
                    .filter(|m| m.room_id == room.id && m.is_active)
                    .count() as u32;
                LobbyRoom {
                    code: room.code.clone(),
                    active_count,
                    max_players: MAX_PLAYERS,
                    is_full: active_count >= MAX_PLAYERS,
                    is_private: room.is_private,
                }
            })
            .collect())
    }
}
