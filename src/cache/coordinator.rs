//! Cache-aside reads with single-flight population and pattern invalidation.
//!
//! Every failure of the backing store is absorbed here: reads fall back to a
//! direct fetch, writes are skipped, and invalidation logs and moves on. Only
//! errors from the fetch itself reach the caller.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::repos::{ContentPage, RepoError};

use super::config::CacheConfig;
use super::keys::{EntityKey, KeySpace};
use super::store::{KvStore, StoreError};

const METRIC_CACHE_HIT: &str = "curio_cache_hit_total";
const METRIC_CACHE_MISS: &str = "curio_cache_miss_total";
const METRIC_CACHE_BYPASS: &str = "curio_cache_bypass_total";
const METRIC_CACHE_DEGRADED: &str = "curio_cache_degraded_total";
const METRIC_CACHE_INVALIDATED: &str = "curio_cache_invalidated_keys_total";
const METRIC_REPOSITORY_FETCH_MS: &str = "curio_repository_fetch_ms";

const LOCK_TOKEN: &str = "1";

/// Values that record which entities they embed, so edits to those entities can
/// find and drop them.
pub trait CacheEntities {
    fn entities(&self) -> BTreeSet<EntityKey>;
}

impl CacheEntities for ContentPage {
    fn entities(&self) -> BTreeSet<EntityKey> {
        let mut entities = BTreeSet::new();
        for item in &self.items {
            entities.insert(EntityKey::Item(item.id));
            entities.insert(EntityKey::Author(item.author_id));
            if let Some(series_id) = item.series_id {
                entities.insert(EntityKey::Series(series_id));
            }
        }
        entities
    }
}

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the store.
    Hit,
    /// Fetched under the lock and written back.
    Populated,
    /// Lock held elsewhere and still empty after the wait; fetched without writing.
    Bypassed,
    /// Store unreachable or caching disabled; fetched directly.
    Degraded,
}

impl CacheOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Populated => "populated",
            CacheOutcome::Bypassed => "bypassed",
            CacheOutcome::Degraded => "degraded",
        }
    }
}

pub struct CacheCoordinator {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
    config: CacheConfig,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self {
            store,
            keys: KeySpace::new(config.namespace.clone()),
            config,
        }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result.
    ///
    /// At most one caller per key holds the populate lock at a time. Callers that
    /// lose the race wait once for `lock_wait`, re-check, then fetch on their own
    /// without writing. A caller dropped mid-fetch leaves the lock to expire.
    pub async fn get_or_populate<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<(T, CacheOutcome), RepoError>
    where
        T: Serialize + DeserializeOwned + CacheEntities,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        if !self.config.enabled {
            let value = timed_fetch(fetch).await?;
            return Ok((value, CacheOutcome::Degraded));
        }

        match self.read::<T>(key).await {
            Ok(Some(value)) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                return Ok((value, CacheOutcome::Hit));
            }
            Ok(None) => {}
            Err(err) => {
                self.degraded("get", key, &err);
                let value = timed_fetch(fetch).await?;
                return Ok((value, CacheOutcome::Degraded));
            }
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        let lock_key = self.keys.lock(key);
        let acquired = match self
            .store
            .set_nx_ex(&lock_key, LOCK_TOKEN, self.config.lock_ttl())
            .await
        {
            Ok(acquired) => acquired,
            Err(err) => {
                self.degraded("lock", key, &err);
                let value = timed_fetch(fetch).await?;
                return Ok((value, CacheOutcome::Degraded));
            }
        };

        if acquired {
            let epoch = self.epoch().await;
            let fetched = timed_fetch(fetch).await;
            if let Ok(value) = &fetched {
                self.write(key, value).await;
                if self.epoch().await != epoch {
                    debug!(key, "Invalidated during populate; dropping entry");
                    self.delete(&[key.to_string()]).await;
                }
            }
            self.release(&lock_key).await;
            return fetched.map(|value| (value, CacheOutcome::Populated));
        }

        tokio::time::sleep(self.config.lock_wait()).await;
        match self.read::<T>(key).await {
            Ok(Some(value)) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                return Ok((value, CacheOutcome::Hit));
            }
            Ok(None) => {}
            Err(err) => self.degraded("get", key, &err),
        }

        counter!(METRIC_CACHE_BYPASS).increment(1);
        debug!(key, "Populate lock busy; fetching without cache");
        let value = timed_fetch(fetch).await?;
        Ok((value, CacheOutcome::Bypassed))
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "Discarding unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Write reference markers first, then the entry. If any marker is missing the
    /// entry is not written, so every cached entry stays reachable by invalidation.
    async fn write<T: Serialize + CacheEntities>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                self.degraded("encode", key, &StoreError::from(err));
                return;
            }
        };

        let ttl = self.config.entry_ttl();
        for entity in value.entities() {
            let marker = self.keys.reference(entity, key);
            if let Err(err) = self.store.set_ex(&marker, key, ttl).await {
                self.degraded("set_ref", key, &err);
                return;
            }
        }

        if let Err(err) = self.store.set_ex(key, &payload, ttl).await {
            self.degraded("set", key, &err);
        }
    }

    /// A store error reads as no epoch.
    async fn epoch(&self) -> Option<String> {
        self.store.get(&self.keys.epoch()).await.unwrap_or_default()
    }

    async fn bump_epoch(&self) {
        let token = Uuid::new_v4().to_string();
        if let Err(err) = self
            .store
            .set_ex(&self.keys.epoch(), &token, self.config.entry_ttl())
            .await
        {
            warn!(error = %err, "Failed to rotate cache epoch");
        }
    }

    async fn release(&self, lock_key: &str) {
        if let Err(err) = self.store.delete(&[lock_key.to_string()]).await {
            // The lock still expires on its own.
            debug!(lock_key, error = %err, "Failed to release populate lock");
        }
    }

    fn degraded(&self, op: &'static str, key: &str, err: &StoreError) {
        counter!(METRIC_CACHE_DEGRADED, "op" => op).increment(1);
        warn!(op, key, error = %err, "Cache store failed; continuing without cache");
    }

    /// Drop every listing that embeds the item.
    ///
    /// Edits that can move an item to another page or predicate bucket (status,
    /// visibility, sort fields) need [`Self::invalidate_all`] instead.
    #[instrument(skip(self))]
    pub async fn invalidate_by_item(&self, item_id: Uuid) -> u64 {
        self.bump_epoch().await;
        self.invalidate_entity(EntityKey::Item(item_id)).await
    }

    #[instrument(skip(self))]
    pub async fn invalidate_by_series(&self, series_id: Uuid) -> u64 {
        self.bump_epoch().await;
        self.invalidate_entity(EntityKey::Series(series_id)).await
    }

    /// Drop listings embedding any of the author's items, and listings filtered to
    /// the author.
    #[instrument(skip(self))]
    pub async fn invalidate_by_author(&self, author_id: Uuid) -> u64 {
        self.bump_epoch().await;
        let embedded = self.invalidate_entity(EntityKey::Author(author_id)).await;
        let scoped = self
            .sweep(&self.keys.author_listing_pattern(author_id))
            .await;
        embedded + scoped
    }

    /// Drop the whole namespace except the epoch token.
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self) -> u64 {
        self.bump_epoch().await;
        self.sweep(&self.keys.namespace_pattern()).await
    }

    async fn invalidate_entity(&self, entity: EntityKey) -> u64 {
        let pattern = self.keys.reference_pattern(entity);
        let batch = self.config.scan_batch_non_zero();
        let mut cursor: Option<String> = None;
        let mut removed = 0;

        loop {
            let page = match self.store.scan(cursor.as_deref(), &pattern, batch).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(%pattern, error = %err, "Invalidation scan failed");
                    break;
                }
            };

            let mut doomed = Vec::with_capacity(page.keys.len() * 2);
            for marker in page.keys {
                match self.store.get(&marker).await {
                    Ok(Some(listing_key)) => doomed.push(listing_key),
                    Ok(None) => {}
                    Err(err) => warn!(%marker, error = %err, "Failed to read reference marker"),
                }
                doomed.push(marker);
            }
            removed += self.delete(&doomed).await;

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            kind = entity.kind(),
            id = %entity.id(),
            removed,
            "Invalidated cached listings"
        );
        removed
    }

    /// Cursor-based scan-and-delete over `pattern`.
    async fn sweep(&self, pattern: &str) -> u64 {
        let batch = self.config.scan_batch_non_zero();
        let epoch = self.keys.epoch();
        let mut cursor: Option<String> = None;
        let mut removed = 0;

        loop {
            let page = match self.store.scan(cursor.as_deref(), pattern, batch).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(pattern, error = %err, "Invalidation scan failed");
                    break;
                }
            };
            let doomed: Vec<String> = page.keys.into_iter().filter(|key| *key != epoch).collect();
            removed += self.delete(&doomed).await;

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(pattern, removed, "Swept cache keys");
        removed
    }

    async fn delete(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        match self.store.delete(keys).await {
            Ok(removed) => {
                counter!(METRIC_CACHE_INVALIDATED).increment(removed);
                removed
            }
            Err(err) => {
                warn!(keys = keys.len(), error = %err, "Cache delete failed; entries expire by TTL");
                0
            }
        }
    }
}

async fn timed_fetch<T, F, Fut>(fetch: F) -> Result<T, RepoError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, RepoError>>,
{
    let started_at = Instant::now();
    let result = fetch().await;
    histogram!(
        METRIC_REPOSITORY_FETCH_MS,
        "result" => if result.is_ok() { "ok" } else { "error" }
    )
    .record(started_at.elapsed().as_secs_f64() * 1000.0);
    result
}
