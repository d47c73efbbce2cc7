use std::collections::BTreeSet;

use uuid::Uuid;

use crate::domain::types::Role;

/// The identity a listing is requested for.
///
/// `group_ids` stays `None` until memberships are resolved; a caller that already
/// knows them (e.g. from a session) can attach them up front and skip the lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Viewer {
    pub id: Option<Uuid>,
    pub role: Role,
    pub group_ids: Option<BTreeSet<Uuid>>,
}

impl Viewer {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn new(id: Option<Uuid>, role: Role) -> Self {
        Self {
            id,
            role,
            group_ids: None,
        }
    }

    /// Build a viewer from a loosely-typed role token; unknown roles become guests.
    pub fn from_token(id: Option<Uuid>, role: &str) -> Self {
        Self::new(id, Role::from_token(role))
    }

    pub fn with_groups(mut self, group_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.group_ids = Some(group_ids.into_iter().collect());
        self
    }
}
