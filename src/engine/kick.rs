//! Kick-vote moderation: one open vote per room, 80% quorum of everyone but
//! the target, 20-second expiry, live re-tallying as members come and go.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::db::Room;
use crate::fabric::{room_group, GroupEvent};
use crate::protocol::{close_codes, PublicUser, ServerMessage, UserId};
use crate::state::RoomTxn;

use super::RoomEngine;

/// Votes needed to pass: 80% of the eligible set, rounded up, at least one.
fn required_votes(active: &[UserId], target_id: UserId) -> u32 {
    let eligible = active.iter().filter(|id| **id != target_id).count();
    ((eligible as f64 * 0.8).ceil() as u32).max(1)
}

impl RoomEngine {
    /// Open a vote against `target_id`. The requester's ballot counts as an
    /// approval; a vote that reaches quorum immediately resolves without a
    /// timer.
    pub(crate) async fn handle_kick_request(
        &self,
        room: &Room,
        requester: &PublicUser,
        target_id: UserId,
    ) {
        if target_id == requester.id {
            return;
        }
        let code = &room.code;

        let mut txn = match self.store.begin(code).await {
            Ok(txn) => txn,
            Err(err) => {
                tracing::warn!(%code, %err, "could not lock room for kick request");
                self.send_user(
                    code,
                    requester.id,
                    ServerMessage::Error {
                        message: "Room is busy, try again.".to_string(),
                    },
                );
                return;
            }
        };

        if !txn.state().kick_votes.is_empty() {
            txn.abort().await;
            self.send_user(
                code,
                requester.id,
                ServerMessage::Error {
                    message: "Kick vote already in progress.".to_string(),
                },
            );
            return;
        }

        let connected = txn.cell().runtime.connected_user_ids();
        let active = self.active_ids_with(code, connected).await;
        if !active.contains(&target_id) {
            txn.abort().await;
            return;
        }

        {
            let state = txn.state_mut();
            state
                .kick_votes
                .entry(target_id)
                .or_default()
                .insert(requester.id);
            state
                .kick_responses
                .entry(target_id)
                .or_default()
                .insert(requester.id);
        }

        let votes = txn
            .state()
            .kick_votes
            .get(&target_id)
            .map_or(0, BTreeSet::len) as u32;
        let required = required_votes(&active, target_id);

        self.send_group(
            code,
            ServerMessage::KickRequest {
                target_id,
                requester_id: requester.id,
                votes,
                required,
            },
        );
        self.append_system_chat(code, &format!("Kick vote started for player {target_id}."))
            .await;

        if votes >= required {
            self.kick_user(room, txn, target_id, "Voted out").await;
            return;
        }

        // Arm the expiry clock for the open vote.
        let runtime = txn.runtime_mut();
        if !runtime.kick_timeouts.contains_key(&target_id) {
            let engine = self.arc();
            let room = room.clone();
            let task = tokio::spawn(async move {
                engine.kick_timeout(room, target_id).await;
            });
            runtime.kick_timeouts.insert(target_id, task);
        }
        txn.commit().await;
    }

    /// Record one ballot on the open vote against `target_id`.
    pub(crate) async fn handle_kick_vote(
        &self,
        room: &Room,
        voter: &PublicUser,
        target_id: UserId,
        approve: bool,
    ) {
        if target_id == voter.id {
            return;
        }
        let code = &room.code;

        let Ok(mut txn) = self.store.begin(code).await else {
            return;
        };
        if !txn.state().kick_votes.contains_key(&target_id) {
            txn.abort().await;
            return;
        }

        let connected = txn.cell().runtime.connected_user_ids();
        let active = self.active_ids_with(code, connected).await;
        let eligible: Vec<UserId> = active
            .iter()
            .copied()
            .filter(|id| *id != target_id)
            .collect();
        if !eligible.contains(&voter.id) {
            txn.abort().await;
            return;
        }
        if txn
            .state()
            .kick_responses
            .get(&target_id)
            .is_some_and(|responses| responses.contains(&voter.id))
        {
            // One ballot per member.
            txn.abort().await;
            return;
        }

        {
            let state = txn.state_mut();
            state
                .kick_responses
                .entry(target_id)
                .or_default()
                .insert(voter.id);
            if approve {
                state
                    .kick_votes
                    .entry(target_id)
                    .or_default()
                    .insert(voter.id);
            }
            // Departed members' ballots stop counting.
            if let Some(votes) = state.kick_votes.get_mut(&target_id) {
                votes.retain(|id| eligible.contains(id));
            }
            if let Some(responses) = state.kick_responses.get_mut(&target_id) {
                responses.retain(|id| eligible.contains(id));
            }
        }

        let votes = txn
            .state()
            .kick_votes
            .get(&target_id)
            .map_or(0, BTreeSet::len) as u32;
        let responded = txn
            .state()
            .kick_responses
            .get(&target_id)
            .map_or(0, BTreeSet::len) as u32;
        let required = required_votes(&active, target_id);

        if votes >= required {
            self.kick_user(room, txn, target_id, "Voted out").await;
            return;
        }

        self.send_group(
            code,
            ServerMessage::KickUpdate {
                target_id,
                votes,
                required,
                responded,
                eligible: eligible.len() as u32,
            },
        );
        txn.commit().await;
    }

    /// Expiry task: cancel the vote if it is still open after the window.
    async fn kick_timeout(self: Arc<Self>, room: Room, target_id: UserId) {
        tokio::time::sleep(Duration::from_secs(self.game.kick_vote_seconds)).await;

        let Ok(mut txn) = self.store.begin(&room.code).await else {
            return;
        };
        // This task is finishing on its own; drop the handle without abort.
        txn.runtime_mut().kick_timeouts.remove(&target_id);
        if txn.state().kick_votes.contains_key(&target_id) {
            self.cancel_kick_vote_in(&mut txn, target_id, "Vote expired");
        }
        txn.commit().await;
    }

    /// Clear the vote state and tell the room, aborting the expiry task if
    /// one is still pending.
    fn cancel_kick_vote_in(&self, txn: &mut RoomTxn, target_id: UserId, reason: &str) {
        let code = txn.code().to_string();
        txn.runtime_mut().cancel_kick_timeout(target_id);
        txn.state_mut().kick_votes.remove(&target_id);
        txn.state_mut().kick_responses.remove(&target_id);
        self.send_group(
            &code,
            ServerMessage::KickCancel {
                target_id,
                reason: reason.to_string(),
            },
        );
    }

    /// React to a member leaving while a vote is open: cancel the vote if
    /// they were the target, otherwise drop their ballot and re-tally.
    pub(crate) async fn cleanup_kick_votes(&self, room: &Room, user_id: UserId) {
        let code = &room.code;
        let Ok(mut txn) = self.store.begin(code).await else {
            return;
        };
        if txn.state().kick_votes.is_empty() {
            txn.abort().await;
            return;
        }
        if txn.state().kick_votes.contains_key(&user_id) {
            self.cancel_kick_vote_in(&mut txn, user_id, "Player left");
            txn.commit().await;
            return;
        }

        // SAFETY: the map was just checked non-empty.
        #[allow(clippy::unwrap_used)]
        let target_id = *txn.state().kick_votes.keys().next().unwrap();

        let connected = txn.cell().runtime.connected_user_ids();
        let active = self.active_ids_with(code, connected).await;
        let eligible: Vec<UserId> = active
            .iter()
            .copied()
            .filter(|id| *id != target_id)
            .collect();

        {
            let state = txn.state_mut();
            if let Some(votes) = state.kick_votes.get_mut(&target_id) {
                votes.remove(&user_id);
                votes.retain(|id| eligible.contains(id));
            }
            if let Some(responses) = state.kick_responses.get_mut(&target_id) {
                responses.remove(&user_id);
                responses.retain(|id| eligible.contains(id));
            }
        }

        let votes = txn
            .state()
            .kick_votes
            .get(&target_id)
            .map_or(0, BTreeSet::len) as u32;
        let responded = txn
            .state()
            .kick_responses
            .get(&target_id)
            .map_or(0, BTreeSet::len) as u32;
        let required = required_votes(&active, target_id);

        if votes >= required {
            self.kick_user(room, txn, target_id, "Voted out").await;
            return;
        }

        self.send_group(
            code,
            ServerMessage::KickUpdate {
                target_id,
                votes,
                required,
                responded,
                eligible: eligible.len() as u32,
            },
        );
        txn.commit().await;
    }

    /// Remove a player from the room: resolve the vote, notify everyone,
    /// close their sockets, flip the membership row, and refresh presence.
    /// Consumes the caller's open transaction.
    async fn kick_user(&self, room: &Room, mut txn: RoomTxn, target_id: UserId, reason: &str) {
        let code = &room.code;
        self.cancel_kick_vote_in(&mut txn, target_id, reason);

        let line = format!("Player {target_id} was removed ({reason}).");
        self.send_group(code, ServerMessage::System { message: line.clone() });
        self.send_user(
            code,
            target_id,
            ServerMessage::Kicked {
                reason: reason.to_string(),
            },
        );
        self.fabric.group_send(
            &room_group(code),
            GroupEvent::DisconnectUser {
                user_id: target_id,
                close_code: close_codes::VOTED_OUT,
            },
        );

        txn.runtime_mut().cancel_disconnect_task(target_id);
        txn.runtime_mut().connections.remove(&target_id);
        txn.commit().await;

        self.append_system_chat(code, &line).await;
        self.store.reset_connections(code, target_id).await;
        let _ = self.gateway.mark_member_inactive(room.id, target_id).await;
        let _ = self.gateway.sync_empty_since(room.id).await;

        self.broadcast_presence(room).await;
        self.maybe_pause_game(room).await;

        tracing::info!(%code, target_id, reason, "player kicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_is_eighty_percent_rounded_up() {
        // Four members, one target: ceil(0.8 * 3) = 3.
        assert_eq!(required_votes(&[1, 2, 3, 4], 4), 3);
        // Eight members, one target: ceil(0.8 * 7) = 6.
        assert_eq!(required_votes(&[1, 2, 3, 4, 5, 6, 7, 8], 8), 6);
        // Two members: the single eligible voter decides.
        assert_eq!(required_votes(&[1, 2], 2), 1);
    }

    #[test]
    fn test_quorum_floor_is_one() {
        assert_eq!(required_votes(&[1], 1), 1);
        assert_eq!(required_votes(&[], 1), 1);
    }
}
