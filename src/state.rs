//! Room state store: the bridge between in-process game state and the
//! shared key-value store.
//!
//! Each room code owns one in-process cell holding the cached `GameState`
//! plus the transient runtime (sockets, limiter state, task handles) that
//! never leaves the process. Cross-instance agreement comes from two
//! layers: every read-modify-write takes the cell's local mutex first and
//! the distributed `room:{code}:lock` second, and the serialized state in
//! the KV is re-loaded inside that critical section before mutating.
//!
//! When the KV is unreachable the store degrades to a single-process
//! assumption: transactions run against the cached state and the local
//! channel always wins timer ownership. Two instances can briefly both run
//! a round timer during such an outage; once the KV is reachable again the
//! renew step re-establishes a single owner.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{defaults, GameConfig, StorageConfig};
use crate::fabric::{ConnId, MemberIdList};
use crate::kv::{KvError, KvLockHandle, KvStore};
use crate::protocol::{GameStatus, Scores, UserId};
use crate::words;

/// Wall-clock seconds since the Unix epoch, as stored in `started_at`.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn game_state_key(code: &str) -> String {
    format!("room:{code}:game_state")
}

pub fn chat_key(code: &str) -> String {
    format!("room:{code}:chat")
}

pub fn draw_key(code: &str) -> String {
    format!("room:{code}:draw")
}

pub fn lock_key(code: &str) -> String {
    format!("room:{code}:lock")
}

pub fn timer_owner_key(code: &str) -> String {
    format!("room:{code}:timer_owner")
}

pub fn connections_key(code: &str, user_id: UserId) -> String {
    format!("room:{code}:connections:{user_id}")
}

/// Serialized per-room game state. Sets become sorted integer arrays on the
/// wire; integer-keyed maps become string-keyed JSON objects and are parsed
/// back on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default)]
    pub round_index: u32,
    #[serde(default = "defaults::default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "defaults::default_round_seconds")]
    pub round_seconds: u64,
    #[serde(default)]
    pub drawer_id: Option<UserId>,
    #[serde(default)]
    pub last_drawer_id: Option<UserId>,
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub scores: Scores,
    #[serde(default)]
    pub guessed: BTreeSet<UserId>,
    #[serde(default)]
    pub revealed_indices: BTreeSet<usize>,
    #[serde(default)]
    pub started_at: f64,
    #[serde(default)]
    pub kick_votes: HashMap<UserId, BTreeSet<UserId>>,
    #[serde(default)]
    pub kick_responses: HashMap<UserId, BTreeSet<UserId>>,
}

impl GameState {
    pub fn new(game: &GameConfig) -> Self {
        Self {
            status: GameStatus::Waiting,
            round_index: 0,
            max_rounds: game.max_rounds,
            round_seconds: game.round_seconds,
            drawer_id: None,
            last_drawer_id: None,
            word: None,
            scores: Scores::new(),
            guessed: BTreeSet::new(),
            revealed_indices: BTreeSet::new(),
            started_at: 0.0,
            kick_votes: HashMap::new(),
            kick_responses: HashMap::new(),
        }
    }

    /// Masked rendering of the current word, if a round is running.
    pub fn masked_word(&self) -> Option<String> {
        self.word
            .as_deref()
            .map(|word| words::mask_word(word, &self.revealed_indices))
    }

    /// Whole seconds remaining in the current round at `now`.
    pub fn seconds_left(&self, now: f64) -> u64 {
        let elapsed = now - self.started_at;
        if elapsed <= 0.0 {
            return self.round_seconds;
        }
        self.round_seconds.saturating_sub(elapsed as u64)
    }
}

/// Per-process, per-room state that never serializes: live sockets, chat
/// limiter bookkeeping, and the task handles owning timers and grace
/// periods.
#[derive(Default)]
pub struct RoomRuntime {
    pub connections: HashMap<UserId, HashSet<ConnId>>,
    pub chat_history: HashMap<UserId, VecDeque<f64>>,
    pub chat_penalties: HashMap<UserId, u64>,
    pub chat_cooldowns: HashMap<UserId, f64>,
    pub disconnect_tasks: HashMap<UserId, JoinHandle<()>>,
    pub round_timer: Option<JoinHandle<()>>,
    pub kick_timeouts: HashMap<UserId, JoinHandle<()>>,
}

impl RoomRuntime {
    /// Users with at least one live socket on this instance.
    pub fn connected_user_ids(&self) -> MemberIdList {
        self.connections.keys().copied().collect()
    }

    pub fn add_connection(&mut self, user_id: UserId, conn: ConnId) {
        self.connections.entry(user_id).or_default().insert(conn);
    }

    /// Drop one socket; returns `true` when it was the user's last.
    pub fn remove_connection(&mut self, user_id: UserId, conn: ConnId) -> bool {
        let Some(conns) = self.connections.get_mut(&user_id) else {
            return false;
        };
        conns.remove(&conn);
        if conns.is_empty() {
            self.connections.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub fn cancel_disconnect_task(&mut self, user_id: UserId) {
        if let Some(task) = self.disconnect_tasks.remove(&user_id) {
            task.abort();
        }
    }

    pub fn cancel_round_timer(&mut self) {
        if let Some(task) = self.round_timer.take() {
            task.abort();
        }
    }

    pub fn cancel_kick_timeout(&mut self, target_id: UserId) {
        if let Some(task) = self.kick_timeouts.remove(&target_id) {
            task.abort();
        }
    }
}

/// One room's in-process cell: cached state plus transient runtime,
/// guarded together by a single mutex.
pub struct RoomCell {
    pub state: GameState,
    pub runtime: RoomRuntime,
}

/// Value of the `room:{code}:timer_owner` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerOwner {
    pub channel: String,
    pub round_index: u32,
    pub started_at: f64,
}

/// Store of per-code cells plus the KV plumbing shared by every room on
/// this instance.
pub struct RoomStateStore {
    kv: Arc<dyn KvStore>,
    rooms: DashMap<String, Arc<Mutex<RoomCell>>>,
    channel: String,
    game: GameConfig,
    storage: StorageConfig,
}

impl RoomStateStore {
    pub fn new(kv: Arc<dyn KvStore>, game: GameConfig, storage: StorageConfig) -> Self {
        Self {
            kv,
            rooms: DashMap::new(),
            channel: format!("engine-{}", Uuid::new_v4()),
            game,
            storage,
        }
    }

    /// This instance's identity: distributed lock owner token and timer
    /// ownership channel.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn game_config(&self) -> &GameConfig {
        &self.game
    }

    fn cell(&self, code: &str) -> Arc<Mutex<RoomCell>> {
        self.rooms
            .entry(code.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RoomCell {
                    state: GameState::new(&self.game),
                    runtime: RoomRuntime::default(),
                }))
            })
            .clone()
    }

    /// Lock a room's cell without touching the KV. For transient-only
    /// mutations (socket registry, chat limiter) and reads.
    pub async fn local(&self, code: &str) -> OwnedMutexGuard<RoomCell> {
        self.cell(code).lock_owned().await
    }

    /// Open a read-modify-write transaction against the persisted state:
    /// local mutex, then distributed lock, then a refresh of the cached
    /// state from the KV. `commit` writes back and releases; dropping the
    /// transaction releases without writing.
    ///
    /// Fails only when another instance holds the distributed lock past the
    /// blocking wait. An unreachable KV degrades to a purely local
    /// transaction instead of failing.
    pub async fn begin(&self, code: &str) -> Result<RoomTxn, KvError> {
        let guard = self.cell(code).lock_owned().await;

        let dlock = match self
            .kv
            .lock(
                &lock_key(code),
                &self.channel,
                Duration::from_secs(self.storage.lock_timeout_seconds),
                Duration::from_secs(self.storage.lock_wait_seconds),
            )
            .await
        {
            Ok(handle) => Some(handle),
            Err(err @ KvError::LockUnavailable { .. }) => return Err(err),
            Err(KvError::Unavailable(reason)) => {
                tracing::debug!(%code, %reason, "KV unreachable, running local-only transaction");
                None
            }
        };

        let mut txn = RoomTxn {
            guard,
            dlock,
            kv: Arc::clone(&self.kv),
            code: code.to_string(),
            state_ttl: Duration::from_secs(self.storage.room_state_ttl_seconds),
        };
        txn.refresh_from_kv().await;
        Ok(txn)
    }

    // ------------------------------------------------------------------
    // Timer ownership
    // ------------------------------------------------------------------

    fn owner_ttl(&self, seconds: u64) -> Duration {
        Duration::from_secs(seconds + self.storage.timer_owner_grace_seconds)
    }

    /// Claim the round timer for this instance. A fresh
    /// `(round_index, started_at)` pair supersedes whatever owner is
    /// recorded; an equal pair defers to the recorded channel.
    pub async fn claim_timer_owner(&self, code: &str, round_index: u32, started_at: f64) -> bool {
        let key = timer_owner_key(code);
        let owner = TimerOwner {
            channel: self.channel.clone(),
            round_index,
            started_at,
        };
        let Ok(payload) = serde_json::to_vec(&owner) else {
            return true;
        };
        let payload = Bytes::from(payload);
        let ttl = Some(self.owner_ttl(self.game.round_seconds));

        match self.kv.set_nx(&key, payload.clone(), ttl).await {
            Ok(true) => true,
            Ok(false) => {
                let current = match self.kv.get(&key).await {
                    Ok(Some(raw)) => serde_json::from_slice::<TimerOwner>(&raw).ok(),
                    Ok(None) => None,
                    Err(_) => return true,
                };
                match current {
                    Some(current)
                        if current.round_index == round_index
                            && current.started_at == started_at =>
                    {
                        current.channel == self.channel
                    }
                    // Stale owner from an older round: take over.
                    _ => self.kv.set(&key, payload, ttl).await.is_ok(),
                }
            }
            // Unreachable store: the local owner wins until it recovers.
            Err(_) => true,
        }
    }

    /// Extend the ownership TTL for the rest of the round. Returns whether
    /// this instance still owns the timer.
    pub async fn renew_timer_owner(
        &self,
        code: &str,
        round_index: u32,
        started_at: f64,
        seconds_left: u64,
    ) -> bool {
        let key = timer_owner_key(code);
        let ttl = self.owner_ttl(seconds_left);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_slice::<TimerOwner>(&raw) {
                Ok(current) if current.channel == self.channel => {
                    let _ = self.kv.expire(&key, ttl).await;
                    true
                }
                _ => false,
            },
            // Key expired (or never written during an outage): contend for
            // it with NX so exactly one instance resumes ownership.
            Ok(None) => {
                let owner = TimerOwner {
                    channel: self.channel.clone(),
                    round_index,
                    started_at,
                };
                let Ok(payload) = serde_json::to_vec(&owner) else {
                    return false;
                };
                match self.kv.set_nx(&key, Bytes::from(payload), Some(ttl)).await {
                    Ok(won) => won,
                    Err(_) => true,
                }
            }
            // Unreachable store: keep ticking locally.
            Err(_) => true,
        }
    }

    /// Drop ownership if this instance holds it.
    pub async fn release_timer_owner(&self, code: &str) {
        let key = timer_owner_key(code);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => {
                if let Ok(current) = serde_json::from_slice::<TimerOwner>(&raw) {
                    if current.channel == self.channel {
                        let _ = self.kv.delete(&[key.as_str()]).await;
                    }
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Chat and draw history
    // ------------------------------------------------------------------

    pub async fn append_chat(&self, code: &str, entry: &serde_json::Value) {
        let key = chat_key(code);
        let Ok(payload) = serde_json::to_vec(entry) else {
            return;
        };
        if self.kv.list_push(&key, Bytes::from(payload)).await.is_err() {
            return;
        }
        let _ = self
            .kv
            .list_trim_to_tail(&key, self.game.chat_history_limit)
            .await;
        let _ = self
            .kv
            .expire(
                &key,
                Duration::from_secs(self.storage.room_history_ttl_seconds),
            )
            .await;
    }

    pub async fn chat_history(&self, code: &str) -> Vec<serde_json::Value> {
        match self.kv.list_range(&chat_key(code)).await {
            Ok(items) => items
                .iter()
                .filter_map(|raw| serde_json::from_slice(raw).ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn append_draw(&self, code: &str, entry: &serde_json::Value) {
        let key = draw_key(code);
        let Ok(payload) = serde_json::to_vec(entry) else {
            return;
        };
        if self.kv.list_push(&key, Bytes::from(payload)).await.is_err() {
            return;
        }
        let _ = self
            .kv
            .list_trim_to_tail(&key, self.game.draw_history_limit)
            .await;
        let _ = self
            .kv
            .expire(
                &key,
                Duration::from_secs(self.storage.room_history_ttl_seconds),
            )
            .await;
    }

    pub async fn draw_history(&self, code: &str) -> Vec<serde_json::Value> {
        match self.kv.list_range(&draw_key(code)).await {
            Ok(items) => items
                .iter()
                .filter_map(|raw| serde_json::from_slice(raw).ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn clear_draw_history(&self, code: &str) {
        let _ = self.kv.delete(&[draw_key(code).as_str()]).await;
    }

    // ------------------------------------------------------------------
    // Connection reference counts
    // ------------------------------------------------------------------

    pub async fn incr_connection(&self, code: &str, user_id: UserId) -> i64 {
        let key = connections_key(code, user_id);
        let count = self.kv.incr(&key).await.unwrap_or(0);
        let _ = self
            .kv
            .expire(
                &key,
                Duration::from_secs(self.game.disconnect_grace_seconds * 4),
            )
            .await;
        count
    }

    pub async fn decr_connection(&self, code: &str, user_id: UserId) -> i64 {
        self.kv
            .decr(&connections_key(code, user_id))
            .await
            .unwrap_or(0)
    }

    pub async fn connection_count(&self, code: &str, user_id: UserId) -> i64 {
        match self.kv.get(&connections_key(code, user_id)).await {
            Ok(Some(raw)) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            _ => 0,
        }
    }

    pub async fn reset_connections(&self, code: &str, user_id: UserId) {
        let _ = self
            .kv
            .delete(&[connections_key(code, user_id).as_str()])
            .await;
    }
}

/// An open state transaction: local mutex held, distributed lock held
/// (unless the KV is down), cached state refreshed. Mutate through
/// `cell_mut` and finish with [`commit`](Self::commit); dropping without
/// committing releases the distributed lock without persisting.
pub struct RoomTxn {
    guard: OwnedMutexGuard<RoomCell>,
    dlock: Option<KvLockHandle>,
    kv: Arc<dyn KvStore>,
    code: String,
    state_ttl: Duration,
}

impl RoomTxn {
    async fn refresh_from_kv(&mut self) {
        match self.kv.get(&game_state_key(&self.code)).await {
            Ok(Some(raw)) => match serde_json::from_slice::<GameState>(&raw) {
                Ok(state) => self.guard.state = state,
                Err(err) => {
                    tracing::warn!(code = %self.code, %err, "discarding unreadable stored game state");
                }
            },
            Ok(None) => {}
            Err(_) => {}
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn cell(&self) -> &RoomCell {
        &self.guard
    }

    pub fn cell_mut(&mut self) -> &mut RoomCell {
        &mut self.guard
    }

    pub fn state(&self) -> &GameState {
        &self.guard.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.guard.state
    }

    pub fn runtime_mut(&mut self) -> &mut RoomRuntime {
        &mut self.guard.runtime
    }

    /// Release the distributed lock without persisting. Equivalent to
    /// dropping the transaction, but releases inline instead of on a
    /// detached task.
    pub async fn abort(mut self) {
        if let Some(handle) = self.dlock.take() {
            let _ = self.kv.unlock(&handle).await;
        }
    }

    /// Persist the (possibly mutated) state and release the distributed
    /// lock. KV write failures are absorbed: the cache stays authoritative
    /// on this instance.
    pub async fn commit(mut self) {
        if let Ok(payload) = serde_json::to_vec(&self.guard.state) {
            let _ = self
                .kv
                .set(
                    &game_state_key(&self.code),
                    Bytes::from(payload),
                    Some(self.state_ttl),
                )
                .await;
        }
        if let Some(handle) = self.dlock.take() {
            let _ = self.kv.unlock(&handle).await;
        }
    }
}

impl Drop for RoomTxn {
    fn drop(&mut self) {
        // Aborted transaction: free the distributed lock without writing.
        if let Some(handle) = self.dlock.take() {
            let kv = Arc::clone(&self.kv);
            tokio::spawn(async move {
                let _ = kv.unlock(&handle).await;
            });
        }
    }
}
