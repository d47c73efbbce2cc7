//! Normalized listing filters.
//!
//! A raw [`FilterSpec`] is validated exactly once, here. Anything malformed falls
//! back to its default and is logged at debug level; nothing in this module fails.

use std::collections::BTreeSet;

use tracing::debug;
use uuid::Uuid;

use curio_api_types::FilterSpec;

use crate::application::pagination::PageRequest;

const MAX_SEARCH_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    UpdatedAt,
    CreatedAt,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            field: SortField::UpdatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortOrder {
    /// Parse tokens such as `updatedAt-desc`, `created_at_asc` or `rating`.
    ///
    /// A bare field sorts descending. Anything unrecognised yields the default.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        for separator in ['-', ':', '_'] {
            let Some((field, direction)) = token.rsplit_once(separator) else {
                continue;
            };
            if let (Some(field), Some(direction)) = (parse_field(field), parse_direction(direction))
            {
                return Some(Self { field, direction });
            }
        }

        parse_field(token).map(|field| Self {
            field,
            direction: SortDirection::Desc,
        })
    }

    pub fn token(self) -> &'static str {
        match (self.field, self.direction) {
            (SortField::UpdatedAt, SortDirection::Desc) => "updatedAt-desc",
            (SortField::UpdatedAt, SortDirection::Asc) => "updatedAt-asc",
            (SortField::CreatedAt, SortDirection::Desc) => "createdAt-desc",
            (SortField::CreatedAt, SortDirection::Asc) => "createdAt-asc",
            (SortField::Rating, SortDirection::Desc) => "rating-desc",
            (SortField::Rating, SortDirection::Asc) => "rating-asc",
        }
    }
}

fn parse_field(raw: &str) -> Option<SortField> {
    match squash(raw).as_str() {
        "updatedat" | "updated" => Some(SortField::UpdatedAt),
        "createdat" | "created" => Some(SortField::CreatedAt),
        "rating" => Some(SortField::Rating),
        _ => None,
    }
}

fn parse_direction(raw: &str) -> Option<SortDirection> {
    match squash(raw).as_str() {
        "asc" | "ascending" => Some(SortDirection::Asc),
        "desc" | "descending" => Some(SortDirection::Desc),
        _ => None,
    }
}

/// Lowercase and drop separators so `this_week`, `thisWeek` and `this-week` agree.
fn squash(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Today,
    ThisWeek,
    ThisMonth,
}

impl TimeWindow {
    pub fn parse(token: &str) -> Option<Self> {
        match squash(token).as_str() {
            "today" | "day" => Some(TimeWindow::Today),
            "thisweek" | "week" => Some(TimeWindow::ThisWeek),
            "thismonth" | "month" => Some(TimeWindow::ThisMonth),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            TimeWindow::Today => "today",
            TimeWindow::ThisWeek => "this_week",
            TimeWindow::ThisMonth => "this_month",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFilter {
    Locked,
    Unlocked,
    Any,
}

impl LockFilter {
    pub fn parse(token: &str) -> Option<Self> {
        match squash(token).as_str() {
            "locked" | "lock" | "true" => Some(LockFilter::Locked),
            "unlocked" | "unlock" | "false" => Some(LockFilter::Unlocked),
            "any" | "all" => Some(LockFilter::Any),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            LockFilter::Locked => "locked",
            LockFilter::Unlocked => "unlocked",
            LockFilter::Any => "any",
        }
    }

    pub fn admits(self, is_locked: bool) -> bool {
        match self {
            LockFilter::Locked => is_locked,
            LockFilter::Unlocked => !is_locked,
            LockFilter::Any => true,
        }
    }
}

/// Inclusive bounds; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    /// Build bounds, swapping the ends when they arrive inverted.
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        match (min, max) {
            (Some(lo), Some(hi)) if lo > hi => Self {
                min: Some(hi),
                max: Some(lo),
            },
            _ => Self { min, max },
        }
    }

    pub fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: Option<T>) -> bool {
        if self.is_open() {
            return true;
        }
        let Some(value) = value else {
            return false;
        };
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Page size policy applied while normalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// A validated [`FilterSpec`] with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFilter {
    pub page: PageRequest,
    pub sort: SortOrder,
    pub genres: BTreeSet<String>,
    pub year: Bounds<i32>,
    pub rating: Bounds<f64>,
    pub time_window: Option<TimeWindow>,
    pub content_type: Option<String>,
    /// `None` means the caller did not choose; the planner applies the role default.
    pub lock: Option<LockFilter>,
    pub search: Option<String>,
    pub author_id: Option<Uuid>,
    pub include_private: bool,
}

impl Default for ListingFilter {
    fn default() -> Self {
        Self::normalize(&FilterSpec::default(), ListingLimits::default())
    }
}

impl ListingFilter {
    pub fn normalize(spec: &FilterSpec, limits: ListingLimits) -> Self {
        let page = PageRequest::clamped(spec.page, spec.limit, limits);

        let sort = match spec.sort_by.as_deref() {
            None => SortOrder::default(),
            Some(token) => SortOrder::parse(token).unwrap_or_else(|| {
                debug!(field = "sortBy", value = token, "Ignoring unsupported filter value");
                SortOrder::default()
            }),
        };

        let genres = spec
            .genres
            .iter()
            .flatten()
            .filter_map(|genre| normalize_text(genre))
            .collect();

        let rating = Bounds::new(
            spec.rating_min.filter(|value| value.is_finite()),
            spec.rating_max.filter(|value| value.is_finite()),
        );

        let time_window = spec.time_window.as_deref().and_then(|token| {
            let parsed = TimeWindow::parse(token);
            if parsed.is_none() {
                debug!(field = "timeWindow", value = token, "Ignoring unsupported filter value");
            }
            parsed
        });

        let lock = spec.lock_status.as_deref().and_then(|token| {
            let parsed = LockFilter::parse(token);
            if parsed.is_none() {
                debug!(field = "lockStatus", value = token, "Ignoring unsupported filter value");
            }
            parsed
        });

        let search = spec.search.as_deref().and_then(|term| {
            let trimmed = term.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(MAX_SEARCH_CHARS).collect())
        });

        Self {
            page,
            sort,
            genres,
            year: Bounds::new(spec.year_min, spec.year_max),
            rating,
            time_window,
            content_type: spec.content_type.as_deref().and_then(normalize_text),
            lock,
            search,
            author_id: spec.author_id,
            include_private: spec.include_private.unwrap_or(false),
        }
    }
}

fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}
