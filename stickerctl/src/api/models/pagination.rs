//! Offset-based pagination shared by list endpoints.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Default number of items to return per page.
pub const DEFAULT_LIMIT: i64 = 50;

/// Maximum number of items that can be requested per page.
pub const MAX_LIMIT: i64 = 500;

/// Pagination query parameters (`skip`, `limit`).
///
/// The `limit` is clamped between 1 and [`MAX_LIMIT`], `skip` is never negative.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Number of items to skip (default: 0)
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Maximum number of items to return (default: 50, max: 500)
    #[param(default = 50, minimum = 1, maximum = 500)]
    pub limit: Option<i64>,
}

impl Pagination {
    #[inline]
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Get both skip and limit as a tuple, useful for destructuring.
    #[inline]
    pub fn params(&self) -> (i64, i64) {
        (self.skip(), self.limit())
    }
}
