//! Offset pagination helpers.

use crate::application::filter::ListingLimits;

/// One-based page request with a bounded page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Apply defaults: page starts at 1, limit falls back to the default and is
    /// clamped into `1..=max_limit`.
    pub fn clamped(page: Option<u32>, limit: Option<u32>, limits: ListingLimits) -> Self {
        let max_limit = limits.max_limit.max(1);
        let limit = limit
            .filter(|value| *value > 0)
            .unwrap_or(limits.default_limit)
            .clamp(1, max_limit);
        Self {
            page: page.unwrap_or(1).max(1),
            limit,
        }
    }

    // Fields are public, so a hand-built request may hold zeros; read them as 1.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }

    pub fn total_pages(&self, total_count: u64) -> u64 {
        total_count.div_ceil(u64::from(self.limit.max(1)))
    }
}
