//! The listing pipeline: viewer + filter → predicate → descriptor → cached page.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use curio_api_types::{FilterSpec, ListingResponse};

use crate::application::access::AccessPolicyResolver;
use crate::application::filter::{ListingFilter, ListingLimits, LockFilter};
use crate::application::planner::{PlannerConfig, QueryPlanner};
use crate::application::repos::{ContentRepo, RepoError};
use crate::cache::{CacheCoordinator, GroupMembershipCache};
use crate::domain::viewer::Viewer;

#[derive(Debug, Error)]
pub enum ListingError {
    /// Storage failed. Distinct from an empty page, which is `Ok`.
    #[error("listing query failed")]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListingConfig {
    pub limits: ListingLimits,
    pub planner: PlannerConfig,
}

impl From<&crate::config::ListingSettings> for ListingConfig {
    fn from(settings: &crate::config::ListingSettings) -> Self {
        Self {
            limits: ListingLimits {
                default_limit: settings.default_limit.get(),
                max_limit: settings.max_limit.get(),
            },
            planner: PlannerConfig {
                timezone: settings.timezone,
                privileged_lock_default: match settings.privileged_lock_default {
                    crate::config::PrivilegedLockDefault::Unlocked => LockFilter::Unlocked,
                    crate::config::PrivilegedLockDefault::Any => LockFilter::Any,
                },
            },
        }
    }
}

#[derive(Clone)]
pub struct ListingService {
    repo: Arc<dyn ContentRepo>,
    memberships: Arc<GroupMembershipCache>,
    resolver: AccessPolicyResolver,
    coordinator: Arc<CacheCoordinator>,
    planner: QueryPlanner,
    limits: ListingLimits,
}

impl ListingService {
    pub fn new(
        repo: Arc<dyn ContentRepo>,
        memberships: Arc<GroupMembershipCache>,
        coordinator: Arc<CacheCoordinator>,
        config: ListingConfig,
    ) -> Self {
        Self {
            repo,
            resolver: AccessPolicyResolver::new(memberships.clone()),
            memberships,
            coordinator,
            planner: QueryPlanner::new(config.planner),
            limits: config.limits,
        }
    }

    pub async fn list(
        &self,
        viewer: &Viewer,
        spec: &FilterSpec,
    ) -> Result<ListingResponse, ListingError> {
        self.list_at(viewer, spec, OffsetDateTime::now_utc()).await
    }

    /// Like [`Self::list`], resolving time windows against `now`.
    #[instrument(skip_all, fields(role = viewer.role.as_str()))]
    pub async fn list_at(
        &self,
        viewer: &Viewer,
        spec: &FilterSpec,
        now: OffsetDateTime,
    ) -> Result<ListingResponse, ListingError> {
        let filter = ListingFilter::normalize(spec, self.limits);
        let predicate = self.resolver.resolve(viewer).await;
        let descriptor = self.planner.build(&filter, predicate, viewer.role, now);
        let key = self.coordinator.keys().listing(&descriptor);

        let repo = &self.repo;
        let (page, outcome) = self
            .coordinator
            .get_or_populate(&key, || repo.fetch_page(&descriptor))
            .await?;

        debug!(
            outcome = outcome.as_str(),
            items = page.items.len(),
            total = page.total_count,
            "Listing served"
        );

        Ok(ListingResponse {
            total_pages: descriptor.page.total_pages(page.total_count),
            total_count: page.total_count,
            page: descriptor.page.page,
            limit: descriptor.page.limit,
            items: page.items,
        })
    }

    pub async fn invalidate_by_item(&self, item_id: Uuid) -> u64 {
        self.coordinator.invalidate_by_item(item_id).await
    }

    pub async fn invalidate_by_series(&self, series_id: Uuid) -> u64 {
        self.coordinator.invalidate_by_series(series_id).await
    }

    pub async fn invalidate_by_author(&self, author_id: Uuid) -> u64 {
        self.coordinator.invalidate_by_author(author_id).await
    }

    /// Call after any status, visibility or sort-field change.
    pub async fn invalidate_all(&self) -> u64 {
        self.coordinator.invalidate_all().await
    }

    /// Call after any membership or role change for `user_id`.
    pub async fn invalidate_user_groups(&self, user_id: Uuid) -> bool {
        self.memberships.invalidate(user_id).await
    }
}
