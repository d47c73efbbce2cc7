//! Shared domain enumerations aligned with persisted database enums.
//!
//! The definitions live in `curio-api-types` so clients and the server agree on
//! the wire format; this module is the in-crate import path.

pub use curio_api_types::{
    AuthorSummary, ContentItem, ContentStatus, GroupSummary, ItemCounts, Role, SeriesSummary,
    Visibility,
};
