//! Cache store bootstrap.

use std::sync::Arc;

use tracing::info;

use crate::cache::{KvStore, MemoryStore, NoopStore};
use crate::config::{CacheBackend, CacheSettings};

use super::error::InfraError;

/// Open the store selected by `cache.backend`.
///
/// With caching disabled a [`NoopStore`] is returned so every read goes straight
/// to the repository.
pub async fn open_store(settings: &CacheSettings) -> Result<Arc<dyn KvStore>, InfraError> {
    if !settings.enabled {
        info!("Listing cache disabled");
        return Ok(Arc::new(NoopStore));
    }

    match settings.backend {
        CacheBackend::Memory => {
            info!(namespace = %settings.namespace, "Using in-process cache store");
            Ok(Arc::new(MemoryStore::new()))
        }
        CacheBackend::Redis => open_redis(settings).await,
    }
}

#[cfg(feature = "redis")]
async fn open_redis(settings: &CacheSettings) -> Result<Arc<dyn KvStore>, InfraError> {
    let url = settings
        .redis_url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("cache.redis_url is required for redis"))?;
    let store = crate::cache::RedisStore::connect(url).await?;
    info!(namespace = %settings.namespace, "Using redis cache store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_settings: &CacheSettings) -> Result<Arc<dyn KvStore>, InfraError> {
    tracing::warn!("Redis backend requested but this build lacks the `redis` feature");
    Err(InfraError::configuration(
        "cache.backend = \"redis\" requires building with the `redis` feature",
    ))
}
