use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

use crate::application::access::VisibilityPredicate;
use crate::application::filter::{LockFilter, SortDirection, SortField};
use crate::application::planner::QueryDescriptor;
use crate::application::repos::{ContentPage, ContentRepo, RepoError};
use crate::domain::types::{ContentItem, ContentStatus, Visibility};

use super::types::ContentRow;
use super::{PostgresRepositories, map_sqlx_error};

const LISTING_SELECT: &str = "SELECT c.id, c.title, c.description, c.genres, c.content_type, \
     c.release_year, c.rating::float8 AS rating, c.status, c.visibility, c.group_id, \
     c.author_id, c.series_id, c.is_locked, c.created_at, c.updated_at, \
     u.display_name AS author_display_name, u.avatar_url AS author_avatar_url, \
     g.name AS group_name, s.title AS series_title, \
     c.view_count, c.like_count, \
     (SELECT COUNT(*) FROM comments cm WHERE cm.item_id = c.id) AS comment_count \
     FROM content_items c \
     INNER JOIN users u ON u.id = c.author_id \
     LEFT JOIN groups g ON g.id = c.group_id \
     LEFT JOIN series s ON s.id = c.series_id \
     WHERE 1=1 ";

const LISTING_COUNT: &str = "SELECT COUNT(*) FROM content_items c WHERE 1=1 ";

impl PostgresRepositories {
    fn apply_visibility<'q>(qb: &mut QueryBuilder<'q, Postgres>, predicate: &VisibilityPredicate) {
        match predicate {
            VisibilityPredicate::AllButPendingDeletion => {
                qb.push(" AND c.status <> ");
                qb.push_bind(ContentStatus::PendingDeletion);
            }
            VisibilityPredicate::OwnOrPublic { author_id } => {
                qb.push(" AND ((c.author_id = ");
                qb.push_bind(*author_id);
                qb.push(" AND c.status <> ");
                qb.push_bind(ContentStatus::PendingDeletion);
                qb.push(") OR (c.status = ");
                qb.push_bind(ContentStatus::Published);
                qb.push(" AND c.visibility = ");
                qb.push_bind(Visibility::Public);
                qb.push("))");
            }
            VisibilityPredicate::PublicOrGroups { group_ids } => {
                qb.push(" AND c.status = ");
                qb.push_bind(ContentStatus::Published);
                qb.push(" AND (c.visibility = ");
                qb.push_bind(Visibility::Public);
                qb.push(" OR (c.visibility = ");
                qb.push_bind(Visibility::GroupOnly);
                qb.push(" AND c.group_id = ANY(");
                qb.push_bind(group_ids.iter().copied().collect::<Vec<_>>());
                qb.push(")))");
            }
            VisibilityPredicate::PublicOnly => {
                qb.push(" AND c.status = ");
                qb.push_bind(ContentStatus::Published);
                qb.push(" AND c.visibility = ");
                qb.push_bind(Visibility::Public);
            }
        }
    }

    fn apply_listing_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, query: &QueryDescriptor) {
        Self::apply_visibility(qb, &query.visibility);

        if let Some(status) = query.required_status {
            qb.push(" AND c.status = ");
            qb.push_bind(status);
        }

        match query.lock {
            LockFilter::Locked => {
                qb.push(" AND c.is_locked ");
            }
            LockFilter::Unlocked => {
                qb.push(" AND NOT c.is_locked ");
            }
            LockFilter::Any => {}
        }

        if let Some(author_id) = query.author_id {
            qb.push(" AND c.author_id = ");
            qb.push_bind(author_id);
        }

        if !query.genres.is_empty() {
            qb.push(" AND EXISTS (SELECT 1 FROM unnest(c.genres) AS genre WHERE lower(genre) = ANY(");
            qb.push_bind(query.genres.iter().cloned().collect::<Vec<_>>());
            qb.push("))");
        }

        if let Some(min) = query.year.min {
            qb.push(" AND c.release_year >= ");
            qb.push_bind(min);
        }
        if let Some(max) = query.year.max {
            qb.push(" AND c.release_year <= ");
            qb.push_bind(max);
        }

        if let Some(min) = query.rating.min {
            qb.push(" AND c.rating::float8 >= ");
            qb.push_bind(min);
        }
        if let Some(max) = query.rating.max {
            qb.push(" AND c.rating::float8 <= ");
            qb.push_bind(max);
        }

        if let Some(bounds) = query.created {
            qb.push(" AND c.created_at >= ");
            qb.push_bind(bounds.start);
            qb.push(" AND c.created_at < ");
            qb.push_bind(bounds.end);
        }

        if let Some(content_type) = query.content_type.as_ref() {
            qb.push(" AND lower(c.content_type) = ");
            qb.push_bind(content_type.clone());
        }

        if let Some(search) = query.search.as_ref() {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (c.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR c.description ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR EXISTS (SELECT 1 FROM unnest(c.genres) AS genre WHERE genre ILIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\'))");
        }
    }

    fn push_order<'q>(qb: &mut QueryBuilder<'q, Postgres>, query: &QueryDescriptor) {
        let direction = match query.sort.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let column = match query.sort.field {
            SortField::UpdatedAt => "c.updated_at",
            SortField::CreatedAt => "c.created_at",
            SortField::Rating => "c.rating",
        };
        qb.push(format!(
            " ORDER BY {column} {direction} NULLS LAST, c.id {direction}"
        ));
    }
}

/// Escape `%`, `_` and `\` so user text matches literally under `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn fetch_page(&self, query: &QueryDescriptor) -> Result<ContentPage, RepoError> {
        let limit = i64::from(query.page.limit);
        let offset = i64::try_from(query.page.offset()).map_err(|_| RepoError::InvalidInput {
            message: "page offset exceeds supported range".to_string(),
        })?;

        // Count and page must observe the same snapshot.
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if let Some(timeout) = self.statement_timeout() {
            sqlx::query(&format!(
                "SET LOCAL statement_timeout = {}",
                timeout.as_millis()
            ))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        let mut count_qb = QueryBuilder::new(LISTING_COUNT);
        Self::apply_listing_filter(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(LISTING_SELECT);
        Self::apply_listing_filter(&mut qb, query);
        Self::push_order(&mut qb, query);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<ContentRow>()
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let items = rows
            .into_iter()
            .map(ContentItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let total_count = Self::convert_count(total)?;

        debug!(
            items = items.len(),
            total_count,
            page = query.page.page,
            "Fetched listing page"
        );

        Ok(ContentPage { items, total_count })
    }
}
