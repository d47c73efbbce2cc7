//! Key-value store backends for the shared cache.
//!
//! The coordinator only needs five primitives (`get`, `set_ex`, `set_nx_ex`,
//! `delete`, `scan`), which map one-to-one onto Redis commands. [`MemoryStore`]
//! implements the same contract in-process.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache store protocol error: {0}")]
    Protocol(String),
    #[error("cache payload could not be encoded: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// One step of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Cursor for the next step; `None` once the keyspace is exhausted.
    pub next: Option<String>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set only when absent. Returns whether the value was written.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Returns the number of keys that existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Examine roughly `count` keys after `cursor` and return those matching the glob
    /// `pattern` (`*` and `?`).
    async fn scan(
        &self,
        cursor: Option<&str>,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, StoreError>;
}

/// Expired entries are dropped in bulk once per this many writes.
const PRUNE_EVERY: usize = 256;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local store with TTL expiry.
///
/// Keys are kept ordered so scan cursors stay stable while keys are deleted
/// mid-sweep. `set_available(false)` makes every call fail, standing in for an
/// unreachable server.
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read_entries("len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A writer that panicked leaves at worst a stale entry, which expires anyway.
    fn read_entries(&self, op: &'static str) -> RwLockReadGuard<'_, BTreeMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(op, "Recovered poisoned memory store lock");
            poisoned.into_inner()
        })
    }

    fn write_entries(&self, op: &'static str) -> RwLockWriteGuard<'_, BTreeMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(op, "Recovered poisoned memory store lock");
            poisoned.into_inner()
        })
    }

    fn prune_if_due(&self, entries: &mut BTreeMap<String, Entry>, now: Instant) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            entries.retain(|_, entry| entry.is_live(now));
        }
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_available()?;
        let now = Instant::now();
        Ok(self.read_entries("get")
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.ensure_available()?;
        let now = Instant::now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: now + ttl,
        };
        let mut entries = self.write_entries("set_ex");
        self.prune_if_due(&mut entries, now);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut entries = self.write_entries("set_nx_ex");
        self.prune_if_due(&mut entries, now);
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut entries = self.write_entries("delete");
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan(
        &self,
        cursor: Option<&str>,
        pattern: &str,
        count: usize,
    ) -> Result<ScanPage, StoreError> {
        self.ensure_available()?;
        let now = Instant::now();
        let entries = self.read_entries("scan");

        let lower = match cursor {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };
        let mut examined = entries.range::<str, _>((lower, Bound::Unbounded));

        // Expired keys still count towards `count` and move the cursor.
        let mut page = ScanPage::default();
        let mut last = None;
        for (key, entry) in examined.by_ref().take(count.max(1)) {
            let key = key.as_str();
            if entry.is_live(now) && glob_match(pattern, key) {
                page.keys.push(key.to_string());
            }
            last = Some(key);
        }
        if examined.next().is_some() {
            page.next = last.map(str::to_string);
        }
        Ok(page)
    }
}

/// Always-miss, always-succeed store used when caching is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl KvStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn scan(
        &self,
        _cursor: Option<&str>,
        _pattern: &str,
        _count: usize,
    ) -> Result<ScanPage, StoreError> {
        Ok(ScanPage::default())
    }
}

/// Redis-style glob matching restricted to `*` and `?`.
pub(crate) fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    let (mut p, mut c) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, c));
                p += 1;
            }
            Some('?') => {
                p += 1;
                c += 1;
            }
            Some(expected) if *expected == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match star {
                Some((star_p, star_c)) => {
                    p = star_p + 1;
                    c = star_c + 1;
                    star = Some((star_p, star_c + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|ch| *ch == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_semantics() {
        assert!(glob_match("curio:*", "curio:list:a"));
        assert!(glob_match("*|author=x|*", "ns:list:|author=x|page=1|"));
        assert!(!glob_match("*|author=x|*", "ns:list:|author=xy|page=1|"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("curio:ref:*", "curio:list:x"));
    }

    #[tokio::test]
    async fn set_nx_respects_live_keys_and_expiry() {
        let store = MemoryStore::new();
        let ttl = Duration::from_millis(40);

        assert!(store.set_nx_ex("lock", "1", ttl).await.expect("store up"));
        assert!(!store.set_nx_ex("lock", "1", ttl).await.expect("store up"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get("lock").await.expect("store up").is_none());
        assert!(store.set_nx_ex("lock", "1", ttl).await.expect("store up"));
    }

    #[tokio::test]
    async fn scan_walks_every_matching_key_in_small_steps() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        for index in 0..25 {
            store
                .set_ex(&format!("ns:list:{index:02}"), "v", ttl)
                .await
                .expect("store up");
            store
                .set_ex(&format!("ns:other:{index:02}"), "v", ttl)
                .await
                .expect("store up");
        }

        let mut found = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = store
                .scan(cursor.as_deref(), "ns:list:*", 7)
                .await
                .expect("store up");
            // Deleting mid-sweep must not make the cursor skip keys.
            store.delete(&page.keys).await.expect("store up");
            found.extend(page.keys);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(found.len(), 25);
        assert_eq!(store.len(), 25);
    }

    #[tokio::test]
    async fn scan_skips_expired_keys_and_writes_prune_them() {
        let store = MemoryStore::new();
        store
            .set_ex("ns:list:gone", "v", Duration::from_millis(10))
            .await
            .expect("store up");
        store
            .set_ex("ns:list:kept", "v", Duration::from_secs(60))
            .await
            .expect("store up");
        tokio::time::sleep(Duration::from_millis(30)).await;

        let page = store.scan(None, "ns:list:*", 10).await.expect("store up");
        assert_eq!(page.keys, vec!["ns:list:kept".to_string()]);
        // Scanning is read-only; the expired entry is still held.
        assert_eq!(store.read_entries("test").len(), 2);

        for index in 0..PRUNE_EVERY {
            store
                .set_ex(&format!("ns:other:{index}"), "v", Duration::from_secs(60))
                .await
                .expect("store up");
        }
        assert!(!store.read_entries("test").contains_key("ns:list:gone"));
        assert_eq!(store.len(), PRUNE_EVERY + 1);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.set_nx_ex("k", "v", Duration::from_secs(1)).await.is_err());

        store.set_available(true);
        assert!(store.get("k").await.expect("store back").is_none());
    }
}
