//! Round orchestration: the waiting/running/finished state machine, drawer
//! rotation, the countdown timer, hint reveals, and round/game endings.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::db::Room;
use crate::protocol::{GameStatus, PublicUser, RoundEndReason, ServerMessage};
use crate::state::unix_now;
use crate::words;

use super::RoomEngine;

/// How many active members a round needs to start or keep going.
const MIN_PLAYERS: usize = 2;

impl RoomEngine {
    /// Automatic first-round start when a socket joins a fresh room. Rooms
    /// that have already played a round only restart through an explicit
    /// `start_game`, so a join during the inter-round break cannot race the
    /// break task.
    pub async fn maybe_start_game(&self, room: &Room) {
        {
            let cell = self.store.local(&room.code).await;
            if cell.state.status != GameStatus::Waiting || cell.state.round_index > 0 {
                return;
            }
            let connected = cell.runtime.connected_user_ids();
            drop(cell);
            let active = self.active_ids_with(&room.code, connected).await;
            if active.len() < MIN_PLAYERS {
                return;
            }
        }
        self.start_round(room, None).await;
    }

    /// Player-initiated start from the waiting or finished state.
    pub async fn start_game(&self, room: &Room, user: &PublicUser) {
        {
            let cell = self.store.local(&room.code).await;
            if cell.state.status.is_running() {
                return;
            }
        }
        self.start_round(room, Some(user.id)).await;
    }

    /// Begin the next round. With an `initiator`, refusals (not enough
    /// players, lock contention) are reported back to that player;
    /// automatic invocations stay silent.
    pub(crate) fn start_round<'a>(
        &'a self,
        room: &'a Room,
        initiator: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        let code = room.code.clone();

        let mut txn = match self.store.begin(&code).await {
            Ok(txn) => txn,
            Err(err) => {
                tracing::warn!(%code, %err, "could not lock room to start round");
                if let Some(user_id) = initiator {
                    self.send_user(
                        &code,
                        user_id,
                        ServerMessage::Error {
                            message: "Room is busy, try again.".to_string(),
                        },
                    );
                }
                return;
            }
        };

        if txn.state().status.is_running() {
            txn.abort().await;
            return;
        }

        let connected = txn.cell().runtime.connected_user_ids();
        let active = self.active_ids_with(&code, connected).await;
        if active.len() < MIN_PLAYERS {
            txn.abort().await;
            if let Some(user_id) = initiator {
                self.send_user(
                    &code,
                    user_id,
                    ServerMessage::Error {
                        message: "Need at least 2 players to start.".to_string(),
                    },
                );
            }
            return;
        }

        let next_round = txn.state().round_index + 1;
        if next_round > txn.state().max_rounds {
            self.finish_round_of_game(&mut txn);
            txn.commit().await;
            self.store.release_timer_owner(&code).await;
            return;
        }

        let word = words::pick_word().to_string();
        let started_at = unix_now();
        let drawer_id = choose_drawer(&active, txn.state().last_drawer_id);

        {
            let state = txn.state_mut();
            state.status = GameStatus::Running;
            state.round_index = next_round;
            state.word = Some(word.clone());
            state.guessed.clear();
            state.revealed_indices.clear();
            state.started_at = started_at;
            state.drawer_id = drawer_id;
            state.last_drawer_id = drawer_id;
        }

        let Some(drawer_id) = drawer_id else {
            // Unreachable with MIN_PLAYERS members, but never start a round
            // without a drawer.
            txn.abort().await;
            return;
        };

        self.store.clear_draw_history(&code).await;
        self.send_group(&code, ServerMessage::Clear { user: None });

        let masked = txn.state().masked_word().unwrap_or_default();
        self.send_group(
            &code,
            ServerMessage::RoundStart {
                round: next_round,
                max_rounds: txn.state().max_rounds,
                drawer_id,
                masked_word: masked,
                duration: txn.state().round_seconds,
                scores: txn.state().scores.clone(),
            },
        );
        self.send_user(&code, drawer_id, ServerMessage::RoundSecret { word });

        tracing::info!(%code, round = next_round, drawer_id, "round started");

        // Exactly one instance runs the countdown for this round.
        if self.store.claim_timer_owner(&code, next_round, started_at).await {
            let engine = self.arc();
            let room = room.clone();
            let runtime = txn.runtime_mut();
            runtime.cancel_round_timer();
            runtime.round_timer = Some(tokio::spawn(async move {
                engine.round_timer(room, next_round, started_at).await;
            }));
        }

        txn.commit().await;
        })
    }

    /// Countdown loop for one round. Exits silently as soon as the round is
    /// over, the state moved on, or timer ownership is lost.
    async fn round_timer(self: Arc<Self>, room: Room, round_index: u32, started_at: f64) {
        let code = room.code.clone();
        loop {
            let (seconds_left, hint_due) = {
                let cell = self.store.local(&code).await;
                let state = &cell.state;
                if !state.status.is_running()
                    || state.round_index != round_index
                    || state.started_at != started_at
                {
                    return;
                }
                let seconds_left = state.seconds_left(unix_now());
                self.send_group(&code, ServerMessage::Timer { seconds_left });
                (
                    seconds_left,
                    words::is_hint_mark(seconds_left) && state.word.is_some(),
                )
            };

            if hint_due {
                self.reveal_hint(&code, round_index).await;
            }

            if seconds_left == 0 {
                self.end_round(&room, RoundEndReason::Time).await;
                return;
            }

            if !self
                .store
                .renew_timer_owner(&code, round_index, started_at, seconds_left)
                .await
            {
                tracing::debug!(%code, round_index, "timer ownership lost, stopping countdown");
                return;
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Expose one more letter and broadcast the updated mask.
    pub(crate) async fn reveal_hint(&self, code: &str, round_index: u32) {
        let Ok(mut txn) = self.store.begin(code).await else {
            return;
        };
        let state = txn.state_mut();
        if !state.status.is_running() || state.round_index != round_index {
            txn.abort().await;
            return;
        }
        let Some(word) = state.word.clone() else {
            txn.abort().await;
            return;
        };
        words::reveal_one(&word, &mut state.revealed_indices);
        let masked = words::mask_word(&word, &state.revealed_indices);
        self.send_group(code, ServerMessage::Hint { masked_word: masked });
        txn.commit().await;
    }

    /// Close out a running round and schedule what follows: the next round
    /// after the break, or the end of the game.
    pub(crate) async fn end_round(&self, room: &Room, reason: RoundEndReason) {
        let code = room.code.clone();
        let Ok(mut txn) = self.store.begin(&code).await else {
            return;
        };
        if !txn.state().status.is_running() {
            // Already ended by the other trigger (timer vs. final guess).
            txn.abort().await;
            return;
        }

        let word = txn.state().word.clone().unwrap_or_default();
        let scores = txn.state().scores.clone();

        {
            let state = txn.state_mut();
            state.status = GameStatus::Waiting;
            state.word = None;
            state.drawer_id = None;
            state.guessed.clear();
            state.revealed_indices.clear();
        }

        match reason {
            // The countdown task invokes this itself; it exits right after.
            RoundEndReason::Time => {
                txn.runtime_mut().round_timer.take();
            }
            RoundEndReason::AllGuessed => txn.runtime_mut().cancel_round_timer(),
        }

        self.send_group(
            &code,
            ServerMessage::RoundEnd {
                word: word.clone(),
                scores,
                next_round_in: self.game.round_break_seconds,
                reason,
            },
        );

        let final_round = txn.state().round_index >= txn.state().max_rounds;
        txn.commit().await;

        self.store.release_timer_owner(&code).await;
        self.append_system_chat(&code, &format!("Word was: {word}")).await;

        tracing::info!(%code, ?reason, final_round, "round ended");

        let engine = self.arc();
        let room = room.clone();
        let break_seconds = self.game.round_break_seconds;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(break_seconds)).await;
            if final_round {
                engine.finish_game(&room).await;
            } else {
                engine.start_round(&room, None).await;
            }
        });
    }

    /// Park a round when the room drops below two active members. The round
    /// index stays where it is; a later start continues the sequence.
    pub(crate) async fn maybe_pause_game(&self, room: &Room) {
        let code = room.code.clone();
        let Ok(mut txn) = self.store.begin(&code).await else {
            return;
        };
        let connected = txn.cell().runtime.connected_user_ids();
        let active = self.active_ids_with(&code, connected).await;
        if active.len() >= MIN_PLAYERS || !txn.state().status.is_running() {
            txn.abort().await;
            return;
        }

        {
            let state = txn.state_mut();
            state.status = GameStatus::Waiting;
            state.word = None;
            state.drawer_id = None;
        }
        txn.runtime_mut().cancel_round_timer();

        self.send_group(
            &code,
            ServerMessage::RoundPaused {
                message: "Need at least 2 players to continue.".to_string(),
            },
        );
        txn.commit().await;
        self.store.release_timer_owner(&code).await;

        tracing::info!(%code, "round paused below player minimum");
    }

    /// Terminal transition after the last round's break.
    pub(crate) async fn finish_game(&self, room: &Room) {
        let code = room.code.clone();
        let Ok(mut txn) = self.store.begin(&code).await else {
            return;
        };
        self.finish_round_of_game(&mut txn);
        txn.commit().await;
        self.store.release_timer_owner(&code).await;
    }

    fn finish_round_of_game(&self, txn: &mut crate::state::RoomTxn) {
        let code = txn.code().to_string();
        txn.state_mut().status = GameStatus::Finished;
        let scores = txn.state().scores.clone();
        self.send_group(&code, ServerMessage::GameOver { scores });
        tracing::info!(%code, "game over");
    }
}

/// Uniform drawer choice that avoids repeating the previous drawer whenever
/// the exclusion leaves anyone to pick from.
fn choose_drawer(active: &[i64], last_drawer_id: Option<i64>) -> Option<i64> {
    use rand::RngExt;

    if active.is_empty() {
        return None;
    }
    if active.len() == 1 {
        return active.first().copied();
    }
    let choices: Vec<i64> = match last_drawer_id {
        Some(last) => {
            let filtered: Vec<i64> = active.iter().copied().filter(|id| *id != last).collect();
            if filtered.is_empty() {
                active.to_vec()
            } else {
                filtered
            }
        }
        None => active.to_vec(),
    };
    let mut rng = rand::rng();
    let idx = rng.random_range(0..choices.len());
    // SAFETY: `idx` is produced by `random_range(0..len)`, so it is always
    // within [0, len).
    #[allow(clippy::indexing_slicing)]
    let drawer = choices[idx];
    Some(drawer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_drawer_excludes_last() {
        let active = vec![1, 2, 3];
        for _ in 0..64 {
            let drawer = choose_drawer(&active, Some(2)).unwrap();
            assert_ne!(drawer, 2);
            assert!(active.contains(&drawer));
        }
    }

    #[test]
    fn test_choose_drawer_single_member_repeats() {
        assert_eq!(choose_drawer(&[5], Some(5)), Some(5));
    }

    #[test]
    fn test_choose_drawer_two_members_alternate() {
        // With two players the exclusion makes rotation deterministic.
        assert_eq!(choose_drawer(&[1, 2], Some(1)), Some(2));
        assert_eq!(choose_drawer(&[1, 2], Some(2)), Some(1));
    }

    #[test]
    fn test_choose_drawer_empty() {
        assert_eq!(choose_drawer(&[], None), None);
    }
}
