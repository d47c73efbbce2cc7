//! Curio Cache System
//!
//! Shared, visibility-aware caching for content listings:
//!
//! - **Listing cache**: cache-aside pages keyed by the full normalized query,
//!   populated under a single-flight lock and swept by key pattern on writes
//! - **Membership cache**: active group ids per user, used to build member
//!   visibility predicates
//!
//! Both live in one [`KvStore`]. The in-process [`MemoryStore`] serves single
//! instances and tests; the `redis` feature adds [`RedisStore`] for fleets.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "memory"          # or "redis"
//! namespace = "curio"
//! entry_ttl_seconds = 3600
//! lock_ttl_seconds = 10
//! lock_wait_ms = 200
//! ```

mod config;
mod coordinator;
mod keys;
mod membership;
#[cfg(feature = "redis")]
mod redis_store;
mod store;

pub use config::CacheConfig;
pub use coordinator::{CacheCoordinator, CacheEntities, CacheOutcome};
pub use keys::{EntityKey, KeySpace, digest};
pub use membership::GroupMembershipCache;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::{KvStore, MemoryStore, NoopStore, ScanPage, StoreError};
