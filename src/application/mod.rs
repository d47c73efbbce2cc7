//! Application services layer.

pub mod access;
pub mod error;
pub mod filter;
pub mod listing;
pub mod pagination;
pub mod planner;
pub mod repos;
