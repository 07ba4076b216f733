//! Typed operations on the shared key-value store.
//!
//! The engine treats the KV as best-effort: every operation returns a typed
//! error instead of panicking, and callers fall back to in-process state when
//! the store is unreachable. The in-memory implementation backs tests and
//! single-instance deployments.

pub mod memory;

pub use memory::InMemoryKv;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Errors surfaced by KV operations. `Unavailable` is absorbed by callers;
/// `LockUnavailable` aborts the mutating operation that needed the lock.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KvError {
    #[error("key-value store unreachable: {0}")]
    Unavailable(String),
    #[error("lock `{key}` not acquired within {waited_ms} ms")]
    LockUnavailable { key: String, waited_ms: u64 },
}

pub type KvResult<T> = Result<T, KvError>;

/// Proof of lock ownership. `unlock` releases only while `owner` still holds
/// the key, so an expired-and-reacquired lock is never released by the
/// previous holder.
#[derive(Debug, Clone)]
pub struct KvLockHandle {
    pub key: String,
    pub owner: String,
}

/// The slice of the shared store the room engine depends on.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>>;

    /// Set a value, replacing any previous one. `ttl == None` persists until
    /// deleted.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> KvResult<()>;

    /// Set only if the key is absent. Returns whether the write happened.
    async fn set_nx(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> KvResult<bool>;

    /// Refresh a key's TTL. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool>;

    /// Delete keys; returns how many existed.
    async fn delete(&self, keys: &[&str]) -> KvResult<u64>;

    /// Append to the tail of a list key.
    async fn list_push(&self, key: &str, value: Bytes) -> KvResult<()>;

    /// Keep only the newest `keep` entries of a list key.
    async fn list_trim_to_tail(&self, key: &str, keep: usize) -> KvResult<()>;

    /// Full contents of a list key, oldest first.
    async fn list_range(&self, key: &str) -> KvResult<Vec<Bytes>>;

    /// Atomic increment; missing keys start at zero.
    async fn incr(&self, key: &str) -> KvResult<i64>;

    /// Atomic decrement; missing keys start at zero.
    async fn decr(&self, key: &str) -> KvResult<i64>;

    /// Keys matching a glob-style pattern (`*` wildcards).
    async fn scan_match(&self, pattern: &str) -> KvResult<Vec<String>>;

    /// Acquire a distributed mutex. Blocks up to `wait` for the current
    /// holder to release; the acquired lock auto-expires after `timeout`.
    async fn lock(
        &self,
        key: &str,
        owner: &str,
        timeout: Duration,
        wait: Duration,
    ) -> KvResult<KvLockHandle>;

    /// Release a lock if `handle.owner` still holds it. Returns whether a
    /// release happened.
    async fn unlock(&self, handle: &KvLockHandle) -> KvResult<bool>;
}
