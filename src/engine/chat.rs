//! Chat and guess pipeline: burst limiting, guess detection, scoring, and
//! chat fan-out.

use std::collections::VecDeque;

use crate::config::GameConfig;
use crate::db::Room;
use crate::protocol::{PublicUser, RoundEndReason, ServerMessage};
use crate::state::{unix_now, RoomRuntime};

use super::RoomEngine;

/// Outcome of the per-user sliding-window check. `Err` carries the cooldown
/// seconds to report back.
fn check_chat_allowed(
    runtime: &mut RoomRuntime,
    cfg: &GameConfig,
    user_id: i64,
    now: f64,
) -> Result<(), u64> {
    let cooldown_until = runtime.chat_cooldowns.get(&user_id).copied().unwrap_or(0.0);
    if now < cooldown_until {
        let remaining = (cooldown_until - now).ceil() as u64;
        return Err(remaining.max(1));
    }

    let history = runtime
        .chat_history
        .entry(user_id)
        .or_insert_with(VecDeque::new);
    while history
        .front()
        .is_some_and(|sent| now - sent > cfg.chat_window_seconds as f64)
    {
        history.pop_front();
    }

    if history.len() >= cfg.chat_max_burst {
        let penalty = (runtime.chat_penalties.get(&user_id).copied().unwrap_or(0) + 2)
            .min(cfg.max_chat_cooldown);
        runtime.chat_penalties.insert(user_id, penalty);
        runtime.chat_cooldowns.insert(user_id, now + penalty as f64);
        return Err(penalty);
    }

    history.push_back(now);
    if let Some(penalty) = runtime.chat_penalties.get_mut(&user_id) {
        *penalty = penalty.saturating_sub(1);
    }
    Ok(())
}

impl RoomEngine {
    /// Handle one chat frame: block the drawer mid-round, apply the burst
    /// limiter, then treat the text as a guess when a round is running and
    /// as plain chat otherwise.
    pub(crate) async fn handle_chat(
        &self,
        room: &Room,
        sender: &PublicUser,
        message: &str,
        client_id: Option<String>,
    ) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        let code = &room.code;

        // Fast checks against transient state only.
        {
            let mut cell = self.store.local(code).await;
            if cell.state.status.is_running() && cell.state.drawer_id == Some(sender.id) {
                drop(cell);
                self.send_user(
                    code,
                    sender.id,
                    ServerMessage::ChatBlocked {
                        reason: "Chat disabled while drawing.".to_string(),
                        client_id,
                    },
                );
                return;
            }
            if let Err(seconds) =
                check_chat_allowed(&mut cell.runtime, &self.game, sender.id, unix_now())
            {
                drop(cell);
                self.send_user(
                    code,
                    sender.id,
                    ServerMessage::ChatCooldown { seconds, client_id },
                );
                return;
            }
        }

        // Guess candidacy is decided against freshly loaded state under the
        // engine lock.
        let mut txn = match self.store.begin(code).await {
            Ok(txn) => txn,
            Err(err) => {
                tracing::warn!(%code, %err, "could not lock room for chat");
                self.send_user(
                    code,
                    sender.id,
                    ServerMessage::Error {
                        message: "Room is busy, try again.".to_string(),
                    },
                );
                return;
            }
        };

        let normalized = message.to_lowercase();
        let state = txn.state();
        let is_correct_guess = state.status.is_running()
            && state
                .word
                .as_deref()
                .is_some_and(|word| normalized == word.to_lowercase())
            && state.drawer_id != Some(sender.id)
            && !state.guessed.contains(&sender.id);

        if is_correct_guess {
            let points = (100 - 10 * txn.state().guessed.len() as i64).max(20);
            let drawer_id = txn.state().drawer_id;
            {
                let state = txn.state_mut();
                state.guessed.insert(sender.id);
                *state.scores.entry(sender.id).or_insert(0) += points;
                if let Some(drawer_id) = drawer_id {
                    *state.scores.entry(drawer_id).or_insert(0) += 10;
                }
            }
            let scores = txn.state().scores.clone();
            let guessed_count = txn.state().guessed.len();
            let connected = txn.cell().runtime.connected_user_ids();
            txn.commit().await;

            let system_line = format!(
                "[Correct] {} guessed correctly (+{points})",
                sender.name
            );
            self.send_group(
                code,
                ServerMessage::GuessCorrect {
                    user: sender.clone(),
                    points,
                    scores,
                },
            );
            self.send_group(
                code,
                ServerMessage::Chat {
                    message: system_line.clone(),
                    user: None,
                    system: true,
                    client_id: None,
                },
            );
            self.append_system_chat(code, &system_line).await;

            let active = self.active_ids_with(code, connected).await;
            if guessed_count >= active.len().saturating_sub(1) {
                self.end_round(room, RoundEndReason::AllGuessed).await;
            }
        } else {
            txn.abort().await;

            self.send_group(
                code,
                ServerMessage::Chat {
                    message: message.to_string(),
                    user: Some(sender.clone()),
                    system: false,
                    client_id: client_id.clone(),
                },
            );
            let entry = serde_json::json!({
                "id": Self::chat_entry_id(),
                "message": message,
                "user": sender,
                "system": false,
                "client_id": client_id,
            });
            self.store.append_chat(code, &entry).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GameConfig {
        GameConfig::default()
    }

    #[test]
    fn test_burst_within_window_allowed() {
        let mut runtime = RoomRuntime::default();
        let cfg = cfg();
        assert!(check_chat_allowed(&mut runtime, &cfg, 1, 10.0).is_ok());
        assert!(check_chat_allowed(&mut runtime, &cfg, 1, 10.4).is_ok());
        assert!(check_chat_allowed(&mut runtime, &cfg, 1, 11.0).is_ok());
    }

    #[test]
    fn test_fourth_message_in_window_cooled_down() {
        let mut runtime = RoomRuntime::default();
        let cfg = cfg();
        for at in [10.0, 10.3, 10.6] {
            assert!(check_chat_allowed(&mut runtime, &cfg, 1, at).is_ok());
        }
        // Fourth inside the 4s window: first offense costs 2 seconds.
        assert_eq!(check_chat_allowed(&mut runtime, &cfg, 1, 11.2), Err(2));
        // Still cooling down.
        assert_eq!(check_chat_allowed(&mut runtime, &cfg, 1, 12.0), Err(2));
        // Cooldown over and the early messages aged out of the window.
        assert!(check_chat_allowed(&mut runtime, &cfg, 1, 15.2).is_ok());
    }

    #[test]
    fn test_penalty_escalates_while_window_stays_saturated() {
        let mut runtime = RoomRuntime::default();
        let cfg = cfg();
        for at in [10.0, 10.2, 10.4] {
            assert!(check_chat_allowed(&mut runtime, &cfg, 1, at).is_ok());
        }
        // First offense: 2 seconds, cooling down until 12.6.
        assert_eq!(check_chat_allowed(&mut runtime, &cfg, 1, 10.6), Err(2));
        // Right after the cooldown the window is still saturated: 4 seconds.
        assert_eq!(check_chat_allowed(&mut runtime, &cfg, 1, 12.7), Err(4));
        // Once the burst ages out of the window the user can chat again.
        assert!(check_chat_allowed(&mut runtime, &cfg, 1, 16.8).is_ok());
    }

    #[test]
    fn test_penalty_caps_at_configured_maximum() {
        let mut runtime = RoomRuntime::default();
        let cfg = cfg();
        runtime.chat_penalties.insert(1, cfg.max_chat_cooldown - 1);
        for at in [10.0, 10.2, 10.4] {
            assert!(check_chat_allowed(&mut runtime, &cfg, 1, at).is_ok());
        }
        // Three successes decayed the stored penalty by three; the next
        // offense still tops out at the cap's neighborhood, never above it.
        let penalty = check_chat_allowed(&mut runtime, &cfg, 1, 10.6).unwrap_err();
        assert!(penalty <= cfg.max_chat_cooldown);
        assert_eq!(
            penalty,
            (cfg.max_chat_cooldown - 1 - 3 + 2).min(cfg.max_chat_cooldown)
        );
    }

    #[test]
    fn test_good_behavior_decays_penalty() {
        let mut runtime = RoomRuntime::default();
        let cfg = cfg();
        runtime.chat_penalties.insert(1, 6);
        assert!(check_chat_allowed(&mut runtime, &cfg, 1, 100.0).is_ok());
        assert_eq!(runtime.chat_penalties.get(&1), Some(&5));
    }

    #[test]
    fn test_users_limited_independently() {
        let mut runtime = RoomRuntime::default();
        let cfg = cfg();
        for at in [10.0, 10.2, 10.4] {
            assert!(check_chat_allowed(&mut runtime, &cfg, 1, at).is_ok());
        }
        assert!(check_chat_allowed(&mut runtime, &cfg, 1, 10.6).is_err());
        assert!(check_chat_allowed(&mut runtime, &cfg, 2, 10.6).is_ok());
    }

    #[test]
    fn test_cooldown_reports_whole_seconds() {
        let mut runtime = RoomRuntime::default();
        let cfg = cfg();
        runtime.chat_cooldowns.insert(1, 20.0);
        assert_eq!(check_chat_allowed(&mut runtime, &cfg, 1, 19.7), Err(1));
        assert_eq!(check_chat_allowed(&mut runtime, &cfg, 1, 18.2), Err(2));
    }
}
