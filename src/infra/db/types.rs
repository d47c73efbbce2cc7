use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::types::{
    AuthorSummary, ContentItem, ContentStatus, GroupSummary, ItemCounts, SeriesSummary, Visibility,
};

/// One listing row with its author, group and series joined in.
#[derive(sqlx::FromRow)]
pub(super) struct ContentRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub content_type: String,
    pub release_year: Option<i32>,
    pub rating: Option<f64>,
    pub status: ContentStatus,
    pub visibility: Visibility,
    pub group_id: Option<Uuid>,
    pub author_id: Uuid,
    pub series_id: Option<Uuid>,
    pub is_locked: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub author_display_name: String,
    pub author_avatar_url: Option<String>,
    pub group_name: Option<String>,
    pub series_title: Option<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

impl TryFrom<ContentRow> for ContentItem {
    type Error = RepoError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let group = match (row.group_id, row.group_name) {
            (Some(id), Some(name)) => Some(GroupSummary { id, name }),
            _ => None,
        };
        let series = match (row.series_id, row.series_title) {
            (Some(id), Some(title)) => Some(SeriesSummary { id, title }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description.unwrap_or_default(),
            genres: row.genres,
            content_type: row.content_type,
            release_year: row.release_year,
            rating: row.rating,
            status: row.status,
            visibility: row.visibility,
            group_id: row.group_id,
            author_id: row.author_id,
            series_id: row.series_id,
            is_locked: row.is_locked,
            created_at: format_timestamp(row.created_at)?,
            updated_at: format_timestamp(row.updated_at)?,
            author: AuthorSummary {
                id: row.author_id,
                display_name: row.author_display_name,
                avatar_url: row.author_avatar_url,
            },
            group,
            series,
            counts: ItemCounts {
                views: non_negative(row.view_count),
                likes: non_negative(row.like_count),
                comments: non_negative(row.comment_count),
            },
        })
    }
}

fn format_timestamp(value: OffsetDateTime) -> Result<String, RepoError> {
    value.format(&Rfc3339).map_err(|err| RepoError::Integrity {
        message: format!("timestamp cannot be rendered as RFC 3339: {err}"),
    })
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
