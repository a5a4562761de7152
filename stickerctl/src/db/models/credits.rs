//! Store models for the credit ledger: history entries and top-up requests.

use crate::types::{CreditEntryId, CreditRequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Direction of a credit history entry, stored as TEXT
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditEntryKind {
    Credit,
    Debit,
}

/// One append-only line in a user's credit history
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreditEntryDBResponse {
    pub id: CreditEntryId,
    pub user_id: UserId,
    pub kind: CreditEntryKind,
    pub amount: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a top-up request. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for CreditRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditRequestStatus::Pending => write!(f, "pending"),
            CreditRequestStatus::Approved => write!(f, "approved"),
            CreditRequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A user's request to add credits to their balance
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreditRequestDBResponse {
    pub id: CreditRequestId,
    pub user_id: UserId,
    pub amount: i64,
    pub status: CreditRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
}

impl CreditRequestDBResponse {
    /// A fresh pending request
    pub fn pending(user_id: UserId, amount: i64, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            user_id,
            amount,
            status: CreditRequestStatus::Pending,
            requested_at,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
        }
    }

    /// Apply a terminal transition. Callers must have checked the request is pending.
    pub fn resolve(&mut self, resolution: &CreditRequestResolution) {
        match resolution.decision {
            CreditRequestDecision::Approve => {
                self.status = CreditRequestStatus::Approved;
                self.approved_at = Some(resolution.at);
                self.approved_by = Some(resolution.by);
            }
            CreditRequestDecision::Reject => {
                self.status = CreditRequestStatus::Rejected;
                self.rejected_at = Some(resolution.at);
                self.rejected_by = Some(resolution.by);
            }
        }
    }
}

/// Pending request annotated with its owner, for the admin queue
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingCreditRequestDBResponse {
    #[sqlx(flatten)]
    pub request: CreditRequestDBResponse,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditRequestDecision {
    Approve,
    Reject,
}

/// An administrator's decision on a pending request
#[derive(Debug, Clone)]
pub struct CreditRequestResolution {
    pub decision: CreditRequestDecision,
    pub by: UserId,
    pub at: DateTime<Utc>,
    /// Description of the credit entry appended on approval
    pub description: String,
}

/// Result of an atomic conditional debit
#[derive(Debug, Clone)]
pub enum DebitOutcome {
    Applied {
        balance: i64,
        entry: CreditEntryDBResponse,
    },
    /// Balance was below the requested amount; nothing changed
    Insufficient { balance: i64 },
}

/// Result of an atomic request resolution
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Resolved {
        request: CreditRequestDBResponse,
        balance: i64,
        /// The credit entry appended, present only for approvals
        entry: Option<CreditEntryDBResponse>,
    },
    /// No request with that id belongs to that user
    NotFound,
    /// The request already reached a terminal state; nothing changed
    AlreadyResolved { status: CreditRequestStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_resolution_sets_matching_audit_fields() {
        let now = Utc::now();
        let admin = Uuid::new_v4();

        let mut approved = CreditRequestDBResponse::pending(Uuid::new_v4(), 200, now);
        approved.resolve(&CreditRequestResolution {
            decision: CreditRequestDecision::Approve,
            by: admin,
            at: now,
            description: String::new(),
        });
        assert_eq!(approved.status, CreditRequestStatus::Approved);
        assert_eq!(approved.approved_by, Some(admin));
        assert!(approved.approved_at.is_some());
        assert!(approved.rejected_at.is_none() && approved.rejected_by.is_none());

        let mut rejected = CreditRequestDBResponse::pending(Uuid::new_v4(), 200, now);
        rejected.resolve(&CreditRequestResolution {
            decision: CreditRequestDecision::Reject,
            by: admin,
            at: now,
            description: String::new(),
        });
        assert_eq!(rejected.status, CreditRequestStatus::Rejected);
        assert!(rejected.approved_at.is_none() && rejected.approved_by.is_none());
        assert_eq!(rejected.rejected_by, Some(admin));
    }
}
