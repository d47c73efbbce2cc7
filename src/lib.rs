//! Curio: visibility-aware content listings behind a shared, stampede-protected cache.
//!
//! A listing request flows through four stages:
//!
//! 1. [`application::filter`] normalizes the raw [`curio_api_types::FilterSpec`]
//! 2. [`application::access`] maps the viewer to a visibility predicate
//! 3. [`application::planner`] combines both into a storage-agnostic query
//! 4. [`cache::CacheCoordinator`] serves the page from cache or the repository
//!
//! [`application::listing::ListingService`] wires the stages together.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
