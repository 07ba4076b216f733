//! In-memory [`KvStore`] with TTL support.
//!
//! Single-process stand-in for a networked store. Expiry is lazy: entries
//! are dropped when touched after their deadline.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{KvError, KvLockHandle, KvResult, KvStore};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
enum Slot {
    Value(Bytes),
    List(Vec<Bytes>),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// In-memory key-value store with lazy TTL expiry and polling locks.
#[derive(Default)]
pub struct InMemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entry<T>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.expired(now)) {
            entries.remove(key);
        }
        f(entries.get_mut(key))
    }

    fn insert(&self, key: &str, slot: Slot, ttl: Option<Duration>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                slot,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    fn try_lock(&self, key: &str, owner: &str, timeout: Duration) -> bool {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match locks.get(key) {
            Some(held) if held.expires_at > now && held.owner != owner => false,
            _ => {
                locks.insert(
                    key.to_string(),
                    LockEntry {
                        owner: owner.to_string(),
                        expires_at: now + timeout,
                    },
                );
                true
            }
        }
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    // Supports `*` wildcards only, which is all the room key layout needs.
    let segments: Vec<&str> = pattern.split('*').collect();
    match segments.as_slice() {
        [exact] => candidate == *exact,
        [prefix, rest @ ..] => {
            let Some(mut remainder) = candidate.strip_prefix(prefix) else {
                return false;
            };
            let last = rest.len() - 1;
            for (idx, segment) in rest.iter().enumerate() {
                if segment.is_empty() {
                    if idx == last {
                        return true;
                    }
                    continue;
                }
                if idx == last {
                    return remainder.ends_with(segment);
                }
                match remainder.find(segment) {
                    Some(pos) => remainder = &remainder[pos + segment.len()..],
                    None => return false,
                }
            }
            true
        }
        [] => candidate.is_empty(),
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        Ok(self.with_live_entry(key, |entry| match entry {
            Some(Entry {
                slot: Slot::Value(value),
                ..
            }) => Some(value.clone()),
            Some(Entry {
                slot: Slot::Counter(count),
                ..
            }) => Some(Bytes::from(count.to_string())),
            _ => None,
        }))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> KvResult<()> {
        self.insert(key, Slot::Value(value), ttl);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> KvResult<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.expired(now)) {
            entries.remove(key);
        }
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Value(value),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        Ok(self.with_live_entry(key, |entry| match entry {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }))
    }

    async fn delete(&self, keys: &[&str]) -> KvResult<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(*key) {
                if !entry.expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn list_push(&self, key: &str, value: Bytes) -> KvResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.expired(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(Vec::new()),
            expires_at: None,
        });
        match &mut entry.slot {
            Slot::List(items) => items.push(value),
            other => *other = Slot::List(vec![value]),
        }
        Ok(())
    }

    async fn list_trim_to_tail(&self, key: &str, keep: usize) -> KvResult<()> {
        self.with_live_entry(key, |entry| {
            if let Some(Entry {
                slot: Slot::List(items),
                ..
            }) = entry
            {
                if items.len() > keep {
                    let drop = items.len() - keep;
                    items.drain(..drop);
                }
            }
        });
        Ok(())
    }

    async fn list_range(&self, key: &str) -> KvResult<Vec<Bytes>> {
        Ok(self.with_live_entry(key, |entry| match entry {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => items.clone(),
            _ => Vec::new(),
        }))
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.expired(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Counter(0),
            expires_at: None,
        });
        let next = match &entry.slot {
            Slot::Counter(count) => count + 1,
            Slot::Value(raw) => {
                let current: i64 = std::str::from_utf8(raw)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                current + 1
            }
            Slot::List(_) => 1,
        };
        entry.slot = Slot::Counter(next);
        Ok(next)
    }

    async fn decr(&self, key: &str) -> KvResult<i64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.expired(now)) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Counter(0),
            expires_at: None,
        });
        let next = match &entry.slot {
            Slot::Counter(count) => count - 1,
            Slot::Value(raw) => {
                let current: i64 = std::str::from_utf8(raw)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                current - 1
            }
            Slot::List(_) => -1,
        };
        entry.slot = Slot::Counter(next);
        Ok(next)
    }

    async fn scan_match(&self, pattern: &str) -> KvResult<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        Ok(entries
            .iter()
            .filter(|(_, entry)| !entry.expired(now))
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn lock(
        &self,
        key: &str,
        owner: &str,
        timeout: Duration,
        wait: Duration,
    ) -> KvResult<KvLockHandle> {
        let deadline = Instant::now() + wait;
        loop {
            if self.try_lock(key, owner, timeout) {
                return Ok(KvLockHandle {
                    key: key.to_string(),
                    owner: owner.to_string(),
                });
            }
            if Instant::now() >= deadline {
                return Err(KvError::LockUnavailable {
                    key: key.to_string(),
                    waited_ms: wait.as_millis() as u64,
                });
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    async fn unlock(&self, handle: &KvLockHandle) -> KvResult<bool> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        match locks.get(&handle.key) {
            Some(held) if held.owner == handle.owner => {
                locks.remove(&handle.key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_round_trip() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.get("missing").await.unwrap(), None);
        kv.set("k", Bytes::from_static(b"v"), None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let kv = InMemoryKv::new();
        kv.set("k", Bytes::from_static(b"v"), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_nx_respects_live_keys_only() {
        let kv = InMemoryKv::new();
        assert!(kv
            .set_nx("k", Bytes::from_static(b"a"), Some(Duration::from_secs(5)))
            .await
            .unwrap());
        assert!(!kv
            .set_nx("k", Bytes::from_static(b"b"), None)
            .await
            .unwrap());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(kv.set_nx("k", Bytes::from_static(b"c"), None).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some(Bytes::from_static(b"c")));
    }

    #[tokio::test]
    async fn test_list_push_trim_range() {
        let kv = InMemoryKv::new();
        for i in 0..5 {
            kv.list_push("list", Bytes::from(format!("{i}")))
                .await
                .unwrap();
        }
        kv.list_trim_to_tail("list", 3).await.unwrap();
        let items = kv.list_range("list").await.unwrap();
        let items: Vec<&[u8]> = items.iter().map(|b| b.as_ref()).collect();
        assert_eq!(items, vec![b"2".as_ref(), b"3".as_ref(), b"4".as_ref()]);
    }

    #[tokio::test]
    async fn test_counters() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.incr("c").await.unwrap(), 1);
        assert_eq!(kv.incr("c").await.unwrap(), 2);
        assert_eq!(kv.decr("c").await.unwrap(), 1);
        assert_eq!(kv.decr("missing").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_delete_counts_live_keys() {
        let kv = InMemoryKv::new();
        kv.set("a", Bytes::from_static(b"1"), None).await.unwrap();
        kv.set("b", Bytes::from_static(b"2"), None).await.unwrap();
        assert_eq!(kv.delete(&["a", "b", "c"]).await.unwrap(), 2);
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_match() {
        let kv = InMemoryKv::new();
        kv.incr("room:AAAA11:connections:1").await.unwrap();
        kv.incr("room:AAAA11:connections:2").await.unwrap();
        kv.incr("room:BBBB22:connections:1").await.unwrap();
        let mut keys = kv.scan_match("room:AAAA11:connections:*").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "room:AAAA11:connections:1".to_string(),
                "room:AAAA11:connections:2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_owner_released() {
        let kv = InMemoryKv::new();
        let timeout = Duration::from_secs(10);
        let handle = kv
            .lock("room:X:lock", "chan-a", timeout, Duration::from_millis(10))
            .await
            .unwrap();

        let contended = kv
            .lock("room:X:lock", "chan-b", timeout, Duration::from_millis(10))
            .await;
        assert!(matches!(contended, Err(KvError::LockUnavailable { .. })));

        // A stranger's handle does not release the lock.
        let forged = KvLockHandle {
            key: "room:X:lock".to_string(),
            owner: "chan-b".to_string(),
        };
        assert!(!kv.unlock(&forged).await.unwrap());

        assert!(kv.unlock(&handle).await.unwrap());
        let reacquired = kv
            .lock("room:X:lock", "chan-b", timeout, Duration::from_millis(10))
            .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_after_timeout() {
        let kv = InMemoryKv::new();
        let _stale = kv
            .lock(
                "room:Y:lock",
                "chan-a",
                Duration::from_secs(1),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        let taken = kv
            .lock(
                "room:Y:lock",
                "chan-b",
                Duration::from_secs(1),
                Duration::from_millis(10),
            )
            .await;
        assert!(taken.is_ok());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("room:*:lock", "room:ABCD12:lock"));
        assert!(glob_match("room:ABCD12:*", "room:ABCD12:chat"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("room:*:lock", "room:ABCD12:chat"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }
}
