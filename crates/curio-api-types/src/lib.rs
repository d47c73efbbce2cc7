//! Wire types for curio content listings.
//!
//! Everything here is plain serde data: timestamps travel as RFC 3339 strings and
//! ratings as `f64`, so responses can be cached and re-served byte for byte.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is asking. Unknown role tokens map to [`Role::Guest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Guest,
    Member,
    ContentAdmin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Member => "member",
            Role::ContentAdmin => "content_admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Parse a role token leniently. Case, dashes and underscores are ignored.
    pub fn from_token(token: &str) -> Self {
        let normalized: String = token
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "member" | "user" => Role::Member,
            "contentadmin" | "admin" => Role::ContentAdmin,
            "superadmin" => Role::SuperAdmin,
            _ => Role::Guest,
        }
    }

    /// Roles that moderate content rather than only consume it.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::ContentAdmin | Role::SuperAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "content_status", rename_all = "snake_case")
)]
pub enum ContentStatus {
    Draft,
    PendingApproval,
    Published,
    PendingDeletion,
}

impl ContentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::PendingApproval => "pending_approval",
            ContentStatus::Published => "published",
            ContentStatus::PendingDeletion => "pending_deletion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "content_visibility", rename_all = "snake_case")
)]
pub enum Visibility {
    Public,
    GroupOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemCounts {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

/// A fully denormalized content item as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
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
    /// RFC 3339.
    pub created_at: String,
    /// RFC 3339.
    pub updated_at: String,
    pub author: AuthorSummary,
    pub group: Option<GroupSummary>,
    pub series: Option<SeriesSummary>,
    pub counts: ItemCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingResponse {
    pub items: Vec<ContentItem>,
    pub total_pages: u64,
    pub total_count: u64,
    pub page: u32,
    pub limit: u32,
}

/// Listing filter as it arrives from a client.
///
/// Every field is optional and parsed leniently: a value of the wrong shape is
/// treated as absent instead of failing the request. Numbers may be sent as JSON
/// numbers or numeric strings, and `genres` as an array or a comma-separated string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    #[serde(deserialize_with = "lenient::scalar")]
    pub page: Option<u32>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub limit: Option<u32>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub sort_by: Option<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub genres: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub year_min: Option<i32>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub year_max: Option<i32>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub rating_min: Option<f64>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub rating_max: Option<f64>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub time_window: Option<String>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub content_type: Option<String>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub lock_status: Option<String>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub search: Option<String>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub author_id: Option<Uuid>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub include_private: Option<bool>,
}

mod lenient {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, de::DeserializeOwned};
    use serde_json::Value;

    pub fn scalar<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + FromStr,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => None,
            Value::String(raw) => {
                let trimmed = raw.trim();
                // Strings deserialize directly; everything else goes through FromStr.
                serde_json::from_value::<T>(Value::String(trimmed.to_string()))
                    .ok()
                    .or_else(|| trimmed.parse::<T>().ok())
            }
            other => serde_json::from_value::<T>(other).ok(),
        })
    }

    pub fn string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let items: Vec<String> = match value {
            Value::String(raw) => raw.split(',').map(str::to_string).collect(),
            Value::Array(values) => values
                .into_iter()
                .filter_map(|value| match value {
                    Value::String(raw) => Some(raw),
                    _ => None,
                })
                .collect(),
            _ => return Ok(None),
        };
        Ok(Some(items))
    }
}
