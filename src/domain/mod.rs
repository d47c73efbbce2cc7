//! Domain types shared by the listing pipeline.

pub mod types;
pub mod viewer;
