//! Credit ledger: balances, history, the top-up approval workflow and billable actions.
//!
//! Every balance change goes through one of two atomic store operations, a conditional debit or
//! a request resolution, so the balance never goes negative and every change leaves exactly one
//! history entry.

use std::future::Future;

use tracing::{info, instrument, warn};

use crate::{
    api::models::users::{CurrentUser, Role},
    auth::permissions::require_role,
    config::CreditsConfig,
    db::{
        errors::DbError,
        handlers::Store,
        models::credits::{
            CreditEntryDBResponse, CreditRequestDBResponse, CreditRequestDecision, CreditRequestResolution, DebitOutcome,
            PendingCreditRequestDBResponse, ResolveOutcome,
        },
    },
    errors::{Error, Result},
    metrics::credits as credit_metrics,
    types::{CreditRequestId, UserId, abbrev_uuid},
};

/// Description of the credit entry appended when a top-up is approved
pub const APPROVAL_DESCRIPTION: &str = "Credit purchase approved by admin";

/// A debit that went through
#[derive(Debug, Clone)]
pub struct DebitReceipt {
    pub balance: i64,
    pub entry: CreditEntryDBResponse,
}

/// A request that moved to a terminal state
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub request: CreditRequestDBResponse,
    /// Owner's balance after the resolution
    pub balance: i64,
}

/// Output of a billable action together with its charge
#[derive(Debug, Clone)]
pub struct Charged<T> {
    pub output: T,
    pub receipt: DebitReceipt,
}

/// Why a billable action did not complete as a paid action
#[derive(Debug)]
pub enum ChargeError<T> {
    /// Refused before the action ran (e.g. balance below the cost)
    Rejected(Error),
    /// The action itself failed; nothing was charged
    Action(Error),
    /// The action succeeded but the debit afterwards did not
    Billing { output: T, error: Error },
}

pub struct Ledger<'a> {
    store: &'a dyn Store,
    config: &'a CreditsConfig,
}

impl<'a> Ledger<'a> {
    pub fn new(store: &'a dyn Store, config: &'a CreditsConfig) -> Self {
        Self { store, config }
    }

    /// Atomically remove `amount` credits if the balance covers them.
    #[instrument(skip(self, description), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn debit(&self, user_id: UserId, amount: i64, description: &str) -> Result<DebitReceipt> {
        if amount <= 0 {
            return Err(Error::BadRequest {
                message: "Debit amount must be positive".to_string(),
            });
        }

        match self.store.debit(user_id, amount, description).await {
            Ok(DebitOutcome::Applied { balance, entry }) => {
                credit_metrics::record_debit(amount);
                Ok(DebitReceipt { balance, entry })
            }
            Ok(DebitOutcome::Insufficient { balance }) => {
                credit_metrics::record_debit_rejected();
                Err(Error::InsufficientBalance {
                    balance,
                    requested: amount,
                })
            }
            Err(DbError::NotFound) => Err(user_not_found(user_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// File a pending top-up request after checking the amount against the configured bounds.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn request_top_up(&self, user_id: UserId, amount: i64) -> Result<CreditRequestDBResponse> {
        let bounds = &self.config.top_up;
        if amount < bounds.min || amount > bounds.max || amount % bounds.step != 0 {
            return Err(Error::InvalidAmount {
                amount,
                min: bounds.min,
                max: bounds.max,
                step: bounds.step,
            });
        }

        let request = self.store.create_credit_request(user_id, amount).await.map_err(|e| match e {
            DbError::NotFound => user_not_found(user_id),
            other => other.into(),
        })?;
        credit_metrics::record_top_up("requested");
        info!(request_id = %abbrev_uuid(&request.id), amount, "Top-up requested");
        Ok(request)
    }

    /// All pending requests across users, oldest first. Administrators only.
    pub async fn list_pending_requests(&self, admin: &CurrentUser) -> Result<Vec<PendingCreditRequestDBResponse>> {
        require_role(admin, Role::Administrator)?;
        Ok(self.store.list_pending_credit_requests().await?)
    }

    /// Approve a pending request, crediting its amount to the owner.
    #[instrument(skip(self, admin), fields(admin_id = %abbrev_uuid(&admin.id), user_id = %abbrev_uuid(&user_id), request_id = %abbrev_uuid(&request_id)), err)]
    pub async fn approve_request(&self, admin: &CurrentUser, user_id: UserId, request_id: CreditRequestId) -> Result<ResolvedRequest> {
        let resolved = self.resolve(admin, user_id, request_id, CreditRequestDecision::Approve).await?;
        credit_metrics::record_top_up("approved");
        credit_metrics::record_credit_granted(resolved.request.amount);
        info!(amount = resolved.request.amount, balance = resolved.balance, "Top-up approved");
        Ok(resolved)
    }

    /// Reject a pending request. The balance is untouched.
    #[instrument(skip(self, admin), fields(admin_id = %abbrev_uuid(&admin.id), user_id = %abbrev_uuid(&user_id), request_id = %abbrev_uuid(&request_id)), err)]
    pub async fn reject_request(&self, admin: &CurrentUser, user_id: UserId, request_id: CreditRequestId) -> Result<ResolvedRequest> {
        let resolved = self.resolve(admin, user_id, request_id, CreditRequestDecision::Reject).await?;
        credit_metrics::record_top_up("rejected");
        info!(amount = resolved.request.amount, "Top-up rejected");
        Ok(resolved)
    }

    async fn resolve(
        &self,
        admin: &CurrentUser,
        user_id: UserId,
        request_id: CreditRequestId,
        decision: CreditRequestDecision,
    ) -> Result<ResolvedRequest> {
        require_role(admin, Role::Administrator)?;

        let resolution = CreditRequestResolution {
            decision,
            by: admin.id,
            at: chrono::Utc::now(),
            description: APPROVAL_DESCRIPTION.to_string(),
        };
        match self.store.resolve_credit_request(user_id, request_id, &resolution).await? {
            ResolveOutcome::Resolved { request, balance, .. } => Ok(ResolvedRequest { request, balance }),
            ResolveOutcome::NotFound => Err(Error::NotFound {
                resource: "Credit request".to_string(),
                id: request_id.to_string(),
            }),
            ResolveOutcome::AlreadyResolved { status } => Err(Error::AlreadyResolved { status }),
        }
    }

    /// A user's credit history, newest first
    pub async fn history(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>> {
        self.store.list_credit_history(user_id, skip, limit).await.map_err(|e| match e {
            DbError::NotFound => user_not_found(user_id),
            other => other.into(),
        })
    }

    /// A user's own top-up requests, newest first
    pub async fn requests(&self, user_id: UserId) -> Result<Vec<CreditRequestDBResponse>> {
        self.store.list_credit_requests(user_id).await.map_err(|e| match e {
            DbError::NotFound => user_not_found(user_id),
            other => other.into(),
        })
    }

    /// Run `action` and charge `cost` only once it has succeeded.
    ///
    /// The balance is checked up front so users who cannot pay never trigger the action. The
    /// debit afterwards is still the conditional one, so a concurrent spend between the check
    /// and the charge surfaces as [`ChargeError::Billing`] with the produced output attached.
    #[instrument(skip(self, description, action), fields(user_id = %abbrev_uuid(&user_id)))]
    pub async fn charge_after<T, E, Fut>(
        &self,
        user_id: UserId,
        cost: i64,
        description: &str,
        action: Fut,
    ) -> std::result::Result<Charged<T>, ChargeError<T>>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<Error>,
    {
        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(|e| ChargeError::Rejected(e.into()))?
            .ok_or_else(|| ChargeError::Rejected(user_not_found(user_id)))?;
        if user.balance < cost {
            credit_metrics::record_debit_rejected();
            return Err(ChargeError::Rejected(Error::InsufficientBalance {
                balance: user.balance,
                requested: cost,
            }));
        }

        let output = action.await.map_err(|e| ChargeError::Action(e.into()))?;

        match self.debit(user_id, cost, description).await {
            Ok(receipt) => Ok(Charged { output, receipt }),
            Err(error) => {
                warn!(error = %error, "Action succeeded but charging for it failed");
                Err(ChargeError::Billing { output, error })
            }
        }
    }
}

fn user_not_found(user_id: UserId) -> Error {
    Error::NotFound {
        resource: "User".to_string(),
        id: user_id.to_string(),
    }
}
