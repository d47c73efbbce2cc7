//! Cache configuration.
//!
//! Controls the listing cache and the group membership cache via `curio.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_NAMESPACE: &str = "curio";
const DEFAULT_ENTRY_TTL_SECS: u64 = 3600;
const DEFAULT_LOCK_TTL_SECS: u64 = 10;
const DEFAULT_LOCK_WAIT_MS: u64 = 200;
const DEFAULT_MEMBERSHIP_TTL_SECS: u64 = 1800;
const DEFAULT_SCAN_BATCH: usize = 200;

/// Cache configuration from `curio.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When off, every lookup misses and nothing is written.
    pub enabled: bool,
    /// Prefix shared by every key this process writes.
    pub namespace: String,
    /// Lifetime of a cached listing page.
    pub entry_ttl_secs: u64,
    /// Lifetime of a populate lock; bounds how long a crashed holder blocks others.
    pub lock_ttl_secs: u64,
    /// How long a caller that lost the lock race waits before re-checking.
    pub lock_wait_ms: u64,
    /// Lifetime of a cached group membership set.
    pub membership_ttl_secs: u64,
    /// `COUNT` hint for each invalidation scan step.
    pub scan_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            entry_ttl_secs: DEFAULT_ENTRY_TTL_SECS,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            lock_wait_ms: DEFAULT_LOCK_WAIT_MS,
            membership_ttl_secs: DEFAULT_MEMBERSHIP_TTL_SECS,
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            namespace: settings.namespace.clone(),
            entry_ttl_secs: u64::from(settings.entry_ttl_seconds.get()),
            lock_ttl_secs: u64::from(settings.lock_ttl_seconds.get()),
            lock_wait_ms: settings.lock_wait_ms,
            membership_ttl_secs: u64::from(settings.membership_ttl_seconds.get()),
            scan_batch: settings.scan_batch.get() as usize,
        }
    }
}

impl CacheConfig {
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs.max(1))
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs.max(1))
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn membership_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_ttl_secs.max(1))
    }

    /// Scan batch size, clamping to 1 if zero.
    pub fn scan_batch_non_zero(&self) -> usize {
        self.scan_batch.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.namespace, "curio");
        assert_eq!(config.entry_ttl(), Duration::from_secs(3600));
        assert_eq!(config.lock_ttl(), Duration::from_secs(10));
        assert_eq!(config.lock_wait(), Duration::from_millis(200));
        assert_eq!(config.membership_ttl(), Duration::from_secs(1800));
        assert_eq!(config.scan_batch, 200);
    }

    #[test]
    fn zero_values_clamp_to_min() {
        let config = CacheConfig {
            entry_ttl_secs: 0,
            lock_ttl_secs: 0,
            scan_batch: 0,
            ..Default::default()
        };
        assert_eq!(config.entry_ttl(), Duration::from_secs(1));
        assert_eq!(config.lock_ttl(), Duration::from_secs(1));
        assert_eq!(config.scan_batch_non_zero(), 1);
    }

    #[test]
    fn deserializes_partial_tables() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"namespace":"staging","lock_wait_ms":50}"#)
                .expect("partial config");
        assert_eq!(config.namespace, "staging");
        assert_eq!(config.lock_wait_ms, 50);
        assert_eq!(config.entry_ttl_secs, 3600);
    }
}
