//! Cached active group memberships.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::repos::MembershipRepo;

use super::keys::KeySpace;
use super::store::KvStore;

const METRIC_MEMBERSHIP_HIT: &str = "curio_membership_cache_hit_total";
const METRIC_MEMBERSHIP_MISS: &str = "curio_membership_cache_miss_total";
const METRIC_CACHE_DEGRADED: &str = "curio_cache_degraded_total";

/// Group ids per user, read through the shared store.
///
/// Lookups never fail. When neither the store nor the repository can answer, the
/// user is treated as belonging to no group, which can only hide group content.
pub struct GroupMembershipCache {
    store: Arc<dyn KvStore>,
    repo: Arc<dyn MembershipRepo>,
    keys: KeySpace,
    ttl: Duration,
}

impl GroupMembershipCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        repo: Arc<dyn MembershipRepo>,
        keys: KeySpace,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            repo,
            keys,
            ttl,
        }
    }

    pub async fn group_ids(&self, user_id: Uuid) -> BTreeSet<Uuid> {
        let key = self.keys.user_groups(user_id);

        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<BTreeSet<Uuid>>(&raw) {
                Ok(groups) => {
                    counter!(METRIC_MEMBERSHIP_HIT).increment(1);
                    return groups;
                }
                Err(err) => {
                    warn!(%user_id, error = %err, "Discarding unreadable membership entry");
                }
            },
            Ok(None) => {}
            Err(err) => {
                counter!(METRIC_CACHE_DEGRADED, "op" => "membership_get").increment(1);
                warn!(%user_id, error = %err, "Membership cache read failed");
            }
        }
        counter!(METRIC_MEMBERSHIP_MISS).increment(1);

        let groups = match self.repo.active_group_ids(user_id).await {
            Ok(groups) => groups,
            Err(err) => {
                warn!(%user_id, error = %err, "Membership lookup failed; assuming no groups");
                return BTreeSet::new();
            }
        };

        match serde_json::to_string(&groups) {
            Ok(payload) => {
                if let Err(err) = self.store.set_ex(&key, &payload, self.ttl).await {
                    counter!(METRIC_CACHE_DEGRADED, "op" => "membership_set").increment(1);
                    warn!(%user_id, error = %err, "Membership cache write failed");
                }
            }
            Err(err) => warn!(%user_id, error = %err, "Membership set could not be encoded"),
        }

        debug!(%user_id, groups = groups.len(), "Loaded active group memberships");
        groups
    }

    /// Drop the cached set so the next lookup reads the repository.
    pub async fn invalidate(&self, user_id: Uuid) -> bool {
        let key = self.keys.user_groups(user_id);
        match self.store.delete(&[key]).await {
            Ok(removed) => removed > 0,
            Err(err) => {
                warn!(%user_id, error = %err, "Membership cache invalidation failed");
                false
            }
        }
    }
}
