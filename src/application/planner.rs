//! Query planning: filter + visibility predicate → [`QueryDescriptor`].

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono_tz::Tz;
use time::{Date, OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::application::access::VisibilityPredicate;
use crate::application::filter::{
    Bounds, ListingFilter, LockFilter, SortDirection, SortField, SortOrder, TimeWindow,
};
use crate::application::pagination::PageRequest;
use crate::domain::types::{ContentItem, ContentStatus, Role};
use crate::util::timezone;

/// Half-open interval `[start, end)` a time window resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub window: TimeWindow,
    /// First local day covered by the window; part of the cache key so entries roll
    /// over at calendar boundaries.
    pub anchor: Date,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeBounds {
    pub fn resolve(window: TimeWindow, now: OffsetDateTime, tz: Tz) -> Self {
        let today = timezone::localized_date(now, tz);
        let (anchor, next) = match window {
            TimeWindow::Today => (today, today.next_day().unwrap_or(today)),
            TimeWindow::ThisWeek => {
                let monday = timezone::start_of_week(today);
                (monday, monday + time::Duration::days(7))
            }
            TimeWindow::ThisMonth => (
                timezone::start_of_month(today),
                timezone::start_of_next_month(today),
            ),
        };
        Self {
            window,
            anchor,
            start: timezone::start_of_local_day(anchor, tz),
            end: timezone::start_of_local_day(next, tz),
        }
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// A fully normalized, storage-agnostic listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub visibility: VisibilityPredicate,
    /// Extra status narrowing applied on top of `visibility`.
    pub required_status: Option<ContentStatus>,
    pub lock: LockFilter,
    pub genres: BTreeSet<String>,
    pub year: Bounds<i32>,
    pub rating: Bounds<f64>,
    pub created: Option<TimeBounds>,
    pub content_type: Option<String>,
    pub search: Option<String>,
    pub author_id: Option<Uuid>,
    pub include_private: bool,
    pub sort: SortOrder,
    pub page: PageRequest,
}

impl QueryDescriptor {
    /// Evaluate the descriptor against a single item.
    ///
    /// Storage adapters that cannot push the query down (and tests) filter with this.
    pub fn admits(&self, item: &ContentItem) -> bool {
        if !self.visibility.admits(item) || !self.lock.admits(item.is_locked) {
            return false;
        }
        if self.required_status.is_some_and(|status| item.status != status) {
            return false;
        }
        if self.author_id.is_some_and(|author| item.author_id != author) {
            return false;
        }
        if !self.genres.is_empty()
            && !item
                .genres
                .iter()
                .any(|genre| self.genres.contains(&genre.to_lowercase()))
        {
            return false;
        }
        if !self.year.contains(item.release_year) || !self.rating.contains(item.rating) {
            return false;
        }
        if let Some(bounds) = self.created {
            match parse_timestamp(&item.created_at) {
                Some(created) if bounds.contains(created) => {}
                _ => return false,
            }
        }
        if self
            .content_type
            .as_deref()
            .is_some_and(|content_type| !item.content_type.eq_ignore_ascii_case(content_type))
        {
            return false;
        }
        if let Some(term) = self.search.as_deref() {
            let term = term.to_lowercase();
            let hit = item.title.to_lowercase().contains(&term)
                || item.description.to_lowercase().contains(&term)
                || item
                    .genres
                    .iter()
                    .any(|genre| genre.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }

    /// Ordering consistent with the SQL adapter: the sort column first (nulls last in
    /// either direction), then id in the same direction.
    pub fn compare(&self, a: &ContentItem, b: &ContentItem) -> Ordering {
        let directed = |ordering: Ordering| match self.sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        let primary = match self.sort.field {
            SortField::UpdatedAt => {
                directed(parse_timestamp(&a.updated_at).cmp(&parse_timestamp(&b.updated_at)))
            }
            SortField::CreatedAt => {
                directed(parse_timestamp(&a.created_at).cmp(&parse_timestamp(&b.created_at)))
            }
            SortField::Rating => match (a.rating, b.rating) {
                (Some(x), Some(y)) => directed(x.total_cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };

        primary.then_with(|| directed(a.id.cmp(&b.id)))
    }
}

fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}

#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Calendar used to resolve time windows.
    pub timezone: Tz,
    /// Lock filter for privileged roles that did not ask for one.
    pub privileged_lock_default: LockFilter,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            privileged_lock_default: LockFilter::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPlanner {
    config: PlannerConfig,
}

impl QueryPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        filter: &ListingFilter,
        visibility: VisibilityPredicate,
        role: Role,
        now: OffsetDateTime,
    ) -> QueryDescriptor {
        let lock = filter.lock.unwrap_or(if role.is_privileged() {
            self.config.privileged_lock_default
        } else {
            LockFilter::Unlocked
        });

        // Looking at one author's shelf only shows finished work unless the caller
        // explicitly asked for private items too.
        let required_status = (filter.author_id.is_some() && !filter.include_private)
            .then_some(ContentStatus::Published);

        QueryDescriptor {
            visibility,
            required_status,
            lock,
            genres: filter.genres.clone(),
            year: filter.year,
            rating: filter.rating,
            created: filter
                .time_window
                .map(|window| TimeBounds::resolve(window, now, self.config.timezone)),
            content_type: filter.content_type.clone(),
            search: filter.search.clone(),
            author_id: filter.author_id,
            include_private: filter.include_private && filter.author_id.is_some(),
            sort: filter.sort,
            page: filter.page,
        }
    }
}
