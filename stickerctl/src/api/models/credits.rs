//! API request/response models for the credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::credits::{
    CreditEntryDBResponse, CreditEntryKind, CreditRequestDBResponse, CreditRequestStatus, PendingCreditRequestDBResponse,
};
use crate::types::{CreditEntryId, CreditRequestId, UserId};

/// Request to buy credits. Approved or rejected later by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopUpCreate {
    /// Number of credits requested
    pub amount: i64,
}

/// One line of a user's credit history
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditEntryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CreditEntryId,
    pub kind: CreditEntryKind,
    /// Always positive; `kind` gives the direction
    pub amount: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<CreditEntryDBResponse> for CreditEntryResponse {
    fn from(db: CreditEntryDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            amount: db.amount,
            description: db.description,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditRequestResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CreditRequestId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub amount: i64,
    pub status: CreditRequestStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub approved_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub rejected_by: Option<UserId>,
}

impl From<CreditRequestDBResponse> for CreditRequestResponse {
    fn from(db: CreditRequestDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            amount: db.amount,
            status: db.status,
            requested_at: db.requested_at,
            approved_at: db.approved_at,
            approved_by: db.approved_by,
            rejected_at: db.rejected_at,
            rejected_by: db.rejected_by,
        }
    }
}

/// Pending request in the admin queue, with its owner
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingCreditRequestResponse {
    #[serde(flatten)]
    pub request: CreditRequestResponse,
    pub user_name: String,
    pub user_email: String,
}

impl From<PendingCreditRequestDBResponse> for PendingCreditRequestResponse {
    fn from(db: PendingCreditRequestDBResponse) -> Self {
        Self {
            request: db.request.into(),
            user_name: db.user_name,
            user_email: db.user_email,
        }
    }
}

/// Result of approving or rejecting a request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditRequestResolvedResponse {
    pub request: CreditRequestResponse,
    /// Owner's balance after the decision
    pub balance: i64,
}
