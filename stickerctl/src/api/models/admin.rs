//! Admin dashboard models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::models::users::UserResponse;
use crate::db::models::stats::StatsDBResponse;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserStats {
    pub total: i64,
    pub administrators: i64,
    pub members: i64,
}

/// Credit totals across all accounts
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditStats {
    /// Sum of current balances
    pub outstanding: i64,
    /// Credits added by approved top-ups
    pub approved: i64,
    /// Credits spent on generations
    pub spent: i64,
    pub pending_requests: i64,
    /// Credits waiting in pending top-ups
    pub pending_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationStats {
    pub total: i64,
}

/// System statistics for administrators
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub users: UserStats,
    pub credits: CreditStats,
    pub generations: GenerationStats,
    /// Most recently registered accounts
    pub recent_users: Vec<UserResponse>,
}

impl StatsResponse {
    pub fn new(stats: StatsDBResponse, recent_users: Vec<UserResponse>) -> Self {
        Self {
            users: UserStats {
                total: stats.users_total,
                administrators: stats.administrators,
                members: stats.users_total - stats.administrators,
            },
            credits: CreditStats {
                outstanding: stats.credits_outstanding,
                approved: stats.credits_approved,
                spent: stats.credits_spent,
                pending_requests: stats.pending_requests,
                pending_amount: stats.pending_credits,
            },
            generations: GenerationStats {
                total: stats.generations_total,
            },
            recent_users,
        }
    }
}
