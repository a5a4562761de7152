//! The store trait every persistence backend implements.

use crate::{
    db::{
        errors::Result,
        models::{
            credits::{
                CreditEntryDBResponse, CreditRequestDBResponse, CreditRequestResolution, DebitOutcome, PendingCreditRequestDBResponse,
                ResolveOutcome,
            },
            generations::{GenerationCreateDBRequest, GenerationDBResponse},
            stats::StatsDBResponse,
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    types::{CreditRequestId, GenerationId, UserId},
};

/// Document store holding users together with their embedded credit history and top-up requests.
///
/// Services depend on this trait (as `Arc<dyn Store>`), never on a concrete backend, so tests can
/// run against [`super::InMemoryStore`] while production uses [`super::PostgresStore`].
///
/// The two balance-mutating operations, [`Store::debit`] and [`Store::resolve_credit_request`],
/// must each be applied as one atomic read-modify-write: the conditional check, the balance
/// change and the history append either all happen or none do. Concurrent callers never observe
/// a stale balance.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Create a new user. Fails with a unique violation if the email is taken.
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    /// Get a user by ID
    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>>;

    /// Get a user by (normalised) email
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>>;

    /// List users, newest first
    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<UserDBResponse>>;

    /// Update the fields set on `request`. Fails with `NotFound` for an unknown user and with a
    /// unique violation if the new email belongs to another user.
    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse>;

    /// Decrement the balance by `amount` only if the current balance covers it, appending a
    /// `debit` history entry in the same step. Fails with `NotFound` for an unknown user.
    async fn debit(&self, user_id: UserId, amount: i64, description: &str) -> Result<DebitOutcome>;

    /// Append a new pending top-up request to the user. Fails with `NotFound` for an unknown user.
    async fn create_credit_request(&self, user_id: UserId, amount: i64) -> Result<CreditRequestDBResponse>;

    /// All of a user's top-up requests, newest first. Fails with `NotFound` for an unknown user.
    async fn list_credit_requests(&self, user_id: UserId) -> Result<Vec<CreditRequestDBResponse>>;

    /// Pending requests across all users, oldest first
    async fn list_pending_credit_requests(&self) -> Result<Vec<PendingCreditRequestDBResponse>>;

    /// Move a pending request to a terminal state. Approvals also credit the balance and append
    /// a `credit` history entry, atomically with the status change.
    async fn resolve_credit_request(
        &self,
        user_id: UserId,
        request_id: CreditRequestId,
        resolution: &CreditRequestResolution,
    ) -> Result<ResolveOutcome>;

    /// A user's credit history, newest first. Fails with `NotFound` for an unknown user.
    async fn list_credit_history(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>>;

    /// Record a paid generation. Fails with `NotFound` for an unknown user.
    async fn create_generation(&self, user_id: UserId, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse>;

    /// A user's generations that are not trashed, newest first. Fails with `NotFound` for an
    /// unknown user.
    async fn list_generations(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<GenerationDBResponse>>;

    /// Trash one of the user's generations. Returns `false` if the user has no such generation
    /// or it is already trashed.
    async fn trash_generation(&self, user_id: UserId, generation_id: GenerationId) -> Result<bool>;

    /// System-wide counters
    async fn stats(&self) -> Result<StatsDBResponse>;
}
