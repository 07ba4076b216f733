//! The room engine: one authoritative brain per room, spanning admission,
//! rounds, chat, moderation, and presence.
//!
//! The engine owns every mutation of a room's `GameState` and is the only
//! writer of the room's KV keys. It is deliberately free of socket I/O:
//! inbound frames arrive through [`handle_message`](RoomEngine::handle_message)
//! and everything outbound leaves through the broadcast fabric, so the
//! engine behaves identically under tests and production sockets.

use std::sync::{Arc, Weak};

use crate::config::GameConfig;
use crate::db::{PersistenceGateway, Room};
use crate::fabric::{room_group, BroadcastFabric, GroupEvent, MemberIdList};
use crate::protocol::{ClientMessage, PublicUser, ServerMessage, UserId};
use crate::state::{unix_now, RoomStateStore};

mod chat;
mod kick;
mod presence;
mod rounds;


pub struct RoomEngine {
    store: Arc<RoomStateStore>,
    gateway: Arc<dyn PersistenceGateway>,
    fabric: Arc<BroadcastFabric>,
    game: GameConfig,
    /// Self-handle so timer, grace, and break tasks can be spawned from
    /// `&self` methods.
    this: Weak<RoomEngine>,
}

impl RoomEngine {
    pub fn new(
        store: Arc<RoomStateStore>,
        gateway: Arc<dyn PersistenceGateway>,
        fabric: Arc<BroadcastFabric>,
    ) -> Arc<Self> {
        let game = store.game_config().clone();
        Arc::new_cyclic(|this| Self {
            store,
            gateway,
            fabric,
            game,
            this: this.clone(),
        })
    }

    /// Strong handle to this engine for spawned tasks.
    ///
    /// SAFETY: every caller reaches `&self` through the `Arc` returned by
    /// [`new`](Self::new), so the upgrade always succeeds.
    #[allow(clippy::expect_used)]
    pub(crate) fn arc(&self) -> Arc<Self> {
        self.this.upgrade().expect("engine is always behind an Arc")
    }

    pub fn store(&self) -> &Arc<RoomStateStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    pub fn fabric(&self) -> &Arc<BroadcastFabric> {
        &self.fabric
    }

    pub fn game_config(&self) -> &GameConfig {
        &self.game
    }

    /// Route one inbound frame from an admitted member.
    pub async fn handle_message(&self, room: &Room, user: &PublicUser, message: ClientMessage) {
        match message {
            ClientMessage::Draw { payload } => self.handle_draw(room, user, payload).await,
            ClientMessage::Chat { message, client_id } => {
                self.handle_chat(room, user, &message, client_id).await;
            }
            ClientMessage::Clear => self.handle_clear(room, user).await,
            ClientMessage::StartGame => self.start_game(room, user).await,
            ClientMessage::KickRequest { target_id } => {
                self.handle_kick_request(room, user, target_id).await;
            }
            ClientMessage::KickVote { target_id, approve } => {
                self.handle_kick_vote(room, user, target_id, approve).await;
            }
            ClientMessage::Leave => self.handle_leave(room, user.id).await,
            ClientMessage::Ping => {
                self.send_user(&room.code, user.id, ServerMessage::Pong);
            }
        }
    }

    async fn handle_draw(&self, room: &Room, user: &PublicUser, payload: serde_json::Value) {
        {
            let cell = self.store.local(&room.code).await;
            if !cell.state.status.is_running() || cell.state.drawer_id != Some(user.id) {
                return;
            }
            self.send_group(
                &room.code,
                ServerMessage::Draw {
                    payload: payload.clone(),
                    user: user.clone(),
                },
            );
        }
        self.store.append_draw(&room.code, &payload).await;
    }

    async fn handle_clear(&self, room: &Room, user: &PublicUser) {
        {
            let cell = self.store.local(&room.code).await;
            if !cell.state.status.is_running() || cell.state.drawer_id != Some(user.id) {
                return;
            }
            self.send_group(
                &room.code,
                ServerMessage::Clear {
                    user: Some(user.clone()),
                },
            );
        }
        self.store.clear_draw_history(&room.code).await;
    }

    /// Ask an administrator-closed room's sockets to drain and close.
    pub fn close_room(&self, code: &str, message: &str) {
        self.send_group(
            code,
            ServerMessage::AdminClose {
                message: message.to_string(),
            },
        );
    }

    // ------------------------------------------------------------------
    // Fan-out helpers
    // ------------------------------------------------------------------

    pub(crate) fn send_group(&self, code: &str, message: ServerMessage) {
        self.fabric
            .group_send(&room_group(code), GroupEvent::message(message));
    }

    pub(crate) fn send_user(&self, code: &str, user_id: UserId, message: ServerMessage) {
        self.fabric
            .group_send(&room_group(code), GroupEvent::to_user(user_id, message));
    }

    /// Opaque, time-ordered id for stored chat entries.
    pub(crate) fn chat_entry_id() -> String {
        format!("{:.6}-{}", unix_now(), fastrand::u32(..))
    }

    /// Store a server-generated chat line in the room's replay history.
    pub(crate) async fn append_system_chat(&self, code: &str, text: &str) {
        let entry = serde_json::json!({
            "id": Self::chat_entry_id(),
            "message": text,
            "system": true,
        });
        self.store.append_chat(code, &entry).await;
    }

    /// Member ids considered active for drawer rotation, guess completion,
    /// and kick quorums: sockets on this instance when there are any, the
    /// membership table otherwise.
    pub(crate) async fn active_ids_with(
        &self,
        code: &str,
        connected: MemberIdList,
    ) -> MemberIdList {
        if !connected.is_empty() {
            return connected;
        }
        self.gateway
            .list_active_member_ids(code)
            .await
            .unwrap_or_default()
            .into_iter()
            .collect()
    }
}
