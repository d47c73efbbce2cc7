//! Repository traits describing persistence adapters.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::planner::QueryDescriptor;
use crate::domain::types::ContentItem;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// One page of a listing together with the total size of the filtered set.
///
/// Both halves come from the same snapshot of storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    pub total_count: u64,
}

impl ContentPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
        }
    }
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Read the requested page and the total count as one consistent operation.
    async fn fetch_page(&self, query: &QueryDescriptor) -> Result<ContentPage, RepoError>;
}

#[async_trait]
pub trait MembershipRepo: Send + Sync {
    /// Groups in which `user_id` currently holds an active membership.
    async fn active_group_ids(&self, user_id: Uuid) -> Result<BTreeSet<Uuid>, RepoError>;
}
