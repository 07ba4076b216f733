//! Broadcast fabric: named groups of connections with per-connection
//! delivery queues.
//!
//! Envelopes are wrapped in `Arc` once and the pointer is cloned per
//! recipient, so fanning a message out to a full room costs eight pointer
//! copies rather than eight serializations. Sends never block the caller:
//! a consumer whose queue is saturated simply misses the event, and its own
//! send loop tears the connection down if it stays wedged.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{ServerMessage, UserId};

/// Identity of one socket within the fabric.
pub type ConnId = Uuid;

/// Maximum number of members to stack-allocate for typical room fan-outs.
pub const TYPICAL_ROOM_SIZE: usize = 8;

/// Member-id list that stays on the stack for full rooms.
pub type MemberIdList = SmallVec<[UserId; TYPICAL_ROOM_SIZE]>;

/// Reserved group carrying room-list snapshots to lobby sockets.
pub const LOBBY_GROUP: &str = "rooms_lobby";

/// Group name for a room's sockets.
pub fn room_group(code: &str) -> String {
    format!("room_{code}")
}

/// What travels through a group: a broadcast envelope, an envelope addressed
/// to one user's sockets, or a control command telling a user's sockets to
/// close themselves.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    Message(Arc<ServerMessage>),
    ToUser {
        user_id: UserId,
        message: Arc<ServerMessage>,
    },
    DisconnectUser {
        user_id: UserId,
        close_code: u16,
    },
}

impl GroupEvent {
    pub fn message(message: ServerMessage) -> Self {
        Self::Message(Arc::new(message))
    }

    pub fn to_user(user_id: UserId, message: ServerMessage) -> Self {
        Self::ToUser {
            user_id,
            message: Arc::new(message),
        }
    }
}

/// Registry of groups and their member connections.
#[derive(Default)]
pub struct BroadcastFabric {
    groups: DashMap<String, HashMap<ConnId, mpsc::Sender<GroupEvent>>>,
}

impl BroadcastFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection's delivery queue to a group.
    pub fn join_group(&self, group: &str, conn: ConnId, sender: mpsc::Sender<GroupEvent>) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(conn, sender);
    }

    /// Remove a connection from a group, dropping the group when it empties.
    pub fn leave_group(&self, group: &str, conn: ConnId) {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(&conn);
            let empty = members.is_empty();
            drop(members);
            if empty {
                self.groups.remove_if(group, |_, members| members.is_empty());
            }
        }
    }

    /// Deliver an event to every member of a group. Best-effort and
    /// non-blocking: members with full or closed queues are skipped.
    /// Returns the number of queues the event reached.
    pub fn group_send(&self, group: &str, event: GroupEvent) -> usize {
        let Some(members) = self.groups.get(group) else {
            return 0;
        };
        let mut delivered = 0;
        for (conn, sender) in members.iter() {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(%conn, group, "delivery queue full, dropping group event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(%conn, group, "delivery queue closed, skipping");
                }
            }
        }
        delivered
    }

    /// Number of connections currently in a group.
    pub fn group_len(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |members| members.len())
    }
}
