//! Admission, disconnect grace, voluntary leave, and presence fan-out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::db::Room;
use crate::fabric::{room_group, ConnId, GroupEvent, LOBBY_GROUP};
use crate::kv::KvError;
use crate::protocol::{close_codes, GameStatePayload, PublicUser, ServerMessage, UserId};
use crate::state::unix_now;

use super::RoomEngine;

impl RoomEngine {
    /// Register a freshly authenticated socket with its room: join the
    /// broadcast group, record the connection, seed the score row, cancel
    /// any pending disconnect grace, and bump the cross-instance refcount.
    ///
    /// Fails only when the distributed lock cannot be taken; the caller
    /// should refuse the socket in that case.
    pub async fn admit(
        &self,
        room: &Room,
        user: &PublicUser,
        conn: ConnId,
        sender: mpsc::Sender<GroupEvent>,
    ) -> Result<(), KvError> {
        let code = &room.code;

        let mut txn = self.store.begin(code).await?;
        let cell = txn.cell_mut();
        cell.runtime.add_connection(user.id, conn);
        cell.runtime.cancel_disconnect_task(user.id);
        cell.state.scores.entry(user.id).or_insert(0);
        txn.commit().await;

        self.store.incr_connection(code, user.id).await;
        self.fabric.join_group(&room_group(code), conn, sender);

        tracing::info!(%code, user_id = user.id, %conn, "socket admitted to room");

        self.broadcast_presence(room).await;
        Ok(())
    }

    /// Snapshot envelopes for a just-admitted socket: the game state, the
    /// drawer's secret when applicable, and the chat/draw replay. Reads the
    /// cache refreshed by [`admit`](Self::admit).
    pub async fn welcome_payloads(&self, code: &str, user_id: UserId) -> Vec<ServerMessage> {
        let mut payloads = Vec::new();

        {
            let cell = self.store.local(code).await;
            let state = &cell.state;
            let running = state.status.is_running() && state.word.is_some();
            payloads.push(ServerMessage::GameState(GameStatePayload {
                status: state.status,
                round: state.round_index,
                max_rounds: state.max_rounds,
                drawer_id: running.then(|| state.drawer_id).flatten(),
                masked_word: running.then(|| state.masked_word()).flatten(),
                seconds_left: running.then(|| state.seconds_left(unix_now())),
                scores: state.scores.clone(),
            }));
            if running && state.drawer_id == Some(user_id) {
                if let Some(word) = state.word.clone() {
                    payloads.push(ServerMessage::RoundSecret { word });
                }
            }
        }

        let chat = self.store.chat_history(code).await;
        let draw = self.store.draw_history(code).await;
        if !chat.is_empty() || !draw.is_empty() {
            payloads.push(ServerMessage::History { chat, draw });
        }

        payloads
    }

    /// Unwind one closed socket. When it was the user's last socket on this
    /// instance and the membership row is still active, a grace task is
    /// armed that flips the row after `disconnect_grace_seconds` unless the
    /// user comes back.
    pub async fn handle_disconnect(&self, room: &Room, user_id: UserId, conn: ConnId) {
        let code = room.code.clone();
        self.fabric.leave_group(&room_group(&code), conn);

        let mut schedule_grace = false;
        {
            let mut cell = self.store.local(&code).await;
            let last_socket = cell.runtime.remove_connection(user_id, conn);
            if last_socket && !cell.runtime.disconnect_tasks.contains_key(&user_id) {
                let still_member = self
                    .gateway
                    .is_member_active(room.id, user_id)
                    .await
                    .unwrap_or(false);
                if still_member {
                    let engine = self.arc();
                    let room = room.clone();
                    let task = tokio::spawn(async move {
                        engine.mark_inactive_later(&room, user_id).await;
                    });
                    cell.runtime.disconnect_tasks.insert(user_id, task);
                    schedule_grace = true;
                }
            }
        }

        self.store.decr_connection(&code, user_id).await;

        if schedule_grace {
            tracing::debug!(%code, user_id, "last socket gone, disconnect grace armed");
        }
    }

    /// Grace task body: wait out the window, then deactivate the member if
    /// they have not reconnected anywhere.
    async fn mark_inactive_later(self: Arc<Self>, room: &Room, user_id: UserId) {
        tokio::time::sleep(Duration::from_secs(self.game.disconnect_grace_seconds)).await;

        {
            let mut cell = self.store.local(&room.code).await;
            if cell.runtime.connections.contains_key(&user_id) {
                cell.runtime.disconnect_tasks.remove(&user_id);
                return;
            }
            // Reconnected on another instance: the shared refcount is live.
            if self.store.connection_count(&room.code, user_id).await > 0 {
                cell.runtime.disconnect_tasks.remove(&user_id);
                return;
            }
            cell.runtime.disconnect_tasks.remove(&user_id);
        }

        let _ = self.gateway.mark_member_inactive(room.id, user_id).await;
        let _ = self.gateway.sync_empty_since(room.id).await;

        self.cleanup_kick_votes(room, user_id).await;
        self.broadcast_presence(room).await;
        self.maybe_pause_game(room).await;

        tracing::info!(code = %room.code, user_id, "member deactivated after disconnect grace");
    }

    /// Voluntary departure: no grace, sockets are told to close, the
    /// membership row flips immediately.
    pub async fn handle_leave(&self, room: &Room, user_id: UserId) {
        {
            let mut cell = self.store.local(&room.code).await;
            cell.runtime.cancel_disconnect_task(user_id);
            cell.runtime.connections.remove(&user_id);
        }

        self.fabric.group_send(
            &room_group(&room.code),
            GroupEvent::DisconnectUser {
                user_id,
                close_code: close_codes::FORBIDDEN,
            },
        );

        let _ = self.gateway.mark_member_inactive(room.id, user_id).await;
        let _ = self.gateway.sync_empty_since(room.id).await;

        self.cleanup_kick_votes(room, user_id).await;
        self.broadcast_presence(room).await;
        self.maybe_pause_game(room).await;
    }

    /// Push the member roster to the room and refresh the lobby listing.
    pub async fn broadcast_presence(&self, room: &Room) {
        let members = self
            .gateway
            .list_active_members(room.id)
            .await
            .unwrap_or_default();
        self.send_group(&room.code, ServerMessage::Presence { members });
        self.broadcast_lobby().await;
    }

    /// Ship a fresh room-list snapshot to every lobby socket.
    pub async fn broadcast_lobby(&self) {
        let snapshot = crate::lobby::snapshot_message(self.gateway.as_ref()).await;
        self.fabric
            .group_send(LOBBY_GROUP, GroupEvent::message(snapshot));
    }
}
