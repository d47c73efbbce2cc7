use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{MembershipRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

const ACTIVE_MEMBERSHIP: &str = "active";

#[async_trait]
impl MembershipRepo for PostgresRepositories {
    async fn active_group_ids(&self, user_id: Uuid) -> Result<BTreeSet<Uuid>, RepoError> {
        let rows = sqlx::query_scalar::<_, Uuid>(
            "SELECT group_id FROM group_memberships WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(ACTIVE_MEMBERSHIP)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().collect())
    }
}
