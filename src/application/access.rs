//! Role-based visibility rules.
//!
//! Every listing is narrowed by exactly one [`VisibilityPredicate`]. The mapping from
//! role to predicate lives here and nowhere else.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::cache::GroupMembershipCache;
use crate::domain::types::{ContentItem, ContentStatus, Role, Visibility};
use crate::domain::viewer::Viewer;

/// What a viewer may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityPredicate {
    /// `status != PendingDeletion`.
    AllButPendingDeletion,
    /// The author's own non-deleted items, or published public items.
    OwnOrPublic { author_id: Uuid },
    /// Published public items, or published group-only items in one of `group_ids`.
    PublicOrGroups { group_ids: BTreeSet<Uuid> },
    /// Published public items only.
    PublicOnly,
}

impl VisibilityPredicate {
    /// Pure role dispatch.
    ///
    /// Roles that need an identity but lack one degrade to [`Self::PublicOnly`], as do
    /// members without any group.
    pub fn for_role(role: Role, viewer_id: Option<Uuid>, group_ids: &BTreeSet<Uuid>) -> Self {
        match (role, viewer_id) {
            (Role::SuperAdmin, _) => Self::AllButPendingDeletion,
            (Role::ContentAdmin, Some(author_id)) => Self::OwnOrPublic { author_id },
            (Role::Member, Some(_)) if !group_ids.is_empty() => Self::PublicOrGroups {
                group_ids: group_ids.clone(),
            },
            _ => Self::PublicOnly,
        }
    }

    pub fn admits(&self, item: &ContentItem) -> bool {
        let published_public =
            item.status == ContentStatus::Published && item.visibility == Visibility::Public;
        match self {
            Self::AllButPendingDeletion => item.status != ContentStatus::PendingDeletion,
            Self::OwnOrPublic { author_id } => {
                (item.author_id == *author_id && item.status != ContentStatus::PendingDeletion)
                    || published_public
            }
            Self::PublicOrGroups { group_ids } => {
                published_public
                    || (item.status == ContentStatus::Published
                        && item.visibility == Visibility::GroupOnly
                        && item.group_id.is_some_and(|group| group_ids.contains(&group)))
            }
            Self::PublicOnly => published_public,
        }
    }
}

/// Resolves viewers to predicates, loading member groups on demand.
#[derive(Clone)]
pub struct AccessPolicyResolver {
    memberships: Arc<GroupMembershipCache>,
}

impl AccessPolicyResolver {
    pub fn new(memberships: Arc<GroupMembershipCache>) -> Self {
        Self { memberships }
    }

    /// Never fails: a membership lookup that cannot complete yields no groups, which
    /// only narrows what the viewer sees.
    pub async fn resolve(&self, viewer: &Viewer) -> VisibilityPredicate {
        let group_ids = match (viewer.role, viewer.id, viewer.group_ids.as_ref()) {
            (Role::Member, _, Some(known)) => known.clone(),
            (Role::Member, Some(user_id), None) => self.memberships.group_ids(user_id).await,
            _ => BTreeSet::new(),
        };
        VisibilityPredicate::for_role(viewer.role, viewer.id, &group_ids)
    }
}
