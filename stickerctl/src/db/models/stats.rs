//! Store model for system-wide counters.

/// Totals across every account. Sums are in credits.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct StatsDBResponse {
    pub users_total: i64,
    pub administrators: i64,
    /// Sum of all current balances
    pub credits_outstanding: i64,
    /// Sum of `credit` history entries
    pub credits_approved: i64,
    /// Sum of `debit` history entries
    pub credits_spent: i64,
    pub pending_requests: i64,
    /// Sum of the amounts of pending requests
    pub pending_credits: i64,
    /// Every recorded generation, trashed ones included
    pub generations_total: i64,
}
