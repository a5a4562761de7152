//! PostgreSQL [`Store`] using sqlx.
//!
//! Users, credit history and credit requests live in three tables. The conditional
//! updates (`balance >= $n`, `status = 'pending'`) are what make debits and approvals
//! atomic: the row lock taken by the `UPDATE` serialises concurrent callers and the
//! loser re-evaluates the predicate against the committed row.

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Store,
        models::{
            credits::{
                CreditEntryDBResponse, CreditEntryKind, CreditRequestDBResponse, CreditRequestDecision, CreditRequestResolution,
                CreditRequestStatus, DebitOutcome, PendingCreditRequestDBResponse, ResolveOutcome,
            },
            generations::{GenerationCreateDBRequest, GenerationDBResponse},
            stats::StatsDBResponse,
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    types::{CreditRequestId, GenerationId, UserId, abbrev_uuid},
};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, balance, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, user_id, kind, amount, description, created_at";
const REQUEST_COLUMNS: &str = "id, user_id, amount, status, requested_at, approved_at, approved_by, rejected_at, rejected_by";
const GENERATION_COLUMNS: &str = "id, user_id, prompt, image_urls, credits, created_at, trashed_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Per-user listings report unknown users as `NotFound`, not as an empty list
    async fn ensure_user_exists(&self, user_id: UserId) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        if exists { Ok(()) } else { Err(DbError::NotFound) }
    }

    async fn insert_entry(
        conn: &mut PgConnection,
        user_id: UserId,
        kind: CreditEntryKind,
        amount: i64,
        description: &str,
    ) -> Result<CreditEntryDBResponse> {
        let entry = sqlx::query_as::<_, CreditEntryDBResponse>(&format!(
            "INSERT INTO credit_history (id, user_id, kind, amount, description) VALUES ($1, $2, $3, $4, $5) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind)
        .bind(amount)
        .bind(description)
        .fetch_one(conn)
        .await?;
        Ok(entry)
    }
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            "INSERT INTO users (id, name, email, password_hash, role, balance) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(request.role)
        .bind(request.initial_balance)
        .fetch_one(&self.pool)
        .await?;
        debug!(user_id = %abbrev_uuid(&user.id), "Created user");
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                password_hash = COALESCE($5, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(request.role)
        .bind(&request.password_hash)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self, description), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn debit(&self, user_id: UserId, amount: i64, description: &str) -> Result<DebitOutcome> {
        let mut tx = self.pool.begin().await?;

        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET balance = balance - $2, updated_at = NOW() WHERE id = $1 AND balance >= $2 RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            let current: Option<i64> = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            return match current {
                Some(balance) => Ok(DebitOutcome::Insufficient { balance }),
                None => Err(DbError::NotFound),
            };
        };

        let entry = Self::insert_entry(&mut tx, user_id, CreditEntryKind::Debit, amount, description).await?;
        tx.commit().await?;

        Ok(DebitOutcome::Applied { balance, entry })
    }

    async fn create_credit_request(&self, user_id: UserId, amount: i64) -> Result<CreditRequestDBResponse> {
        let request = sqlx::query_as::<_, CreditRequestDBResponse>(&format!(
            "INSERT INTO credit_requests (id, user_id, amount) VALUES ($1, $2, $3) RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => DbError::NotFound,
            _ => DbError::from(e),
        })?;
        Ok(request)
    }

    async fn list_credit_requests(&self, user_id: UserId) -> Result<Vec<CreditRequestDBResponse>> {
        self.ensure_user_exists(user_id).await?;
        let requests = sqlx::query_as::<_, CreditRequestDBResponse>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM credit_requests WHERE user_id = $1 ORDER BY requested_at DESC, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn list_pending_credit_requests(&self) -> Result<Vec<PendingCreditRequestDBResponse>> {
        let pending = sqlx::query_as::<_, PendingCreditRequestDBResponse>(
            r#"
            SELECT r.id, r.user_id, r.amount, r.status, r.requested_at, r.approved_at, r.approved_by,
                   r.rejected_at, r.rejected_by, u.name AS user_name, u.email AS user_email
            FROM credit_requests r
            JOIN users u ON u.id = r.user_id
            WHERE r.status = 'pending'
            ORDER BY r.requested_at ASC, r.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(pending)
    }

    #[instrument(skip(self, resolution), fields(user_id = %abbrev_uuid(&user_id), request_id = %abbrev_uuid(&request_id)), err)]
    async fn resolve_credit_request(
        &self,
        user_id: UserId,
        request_id: CreditRequestId,
        resolution: &CreditRequestResolution,
    ) -> Result<ResolveOutcome> {
        let mut tx = self.pool.begin().await?;

        let (status, audit) = match resolution.decision {
            CreditRequestDecision::Approve => (CreditRequestStatus::Approved, "approved_at = $4, approved_by = $5"),
            CreditRequestDecision::Reject => (CreditRequestStatus::Rejected, "rejected_at = $4, rejected_by = $5"),
        };
        let request = sqlx::query_as::<_, CreditRequestDBResponse>(&format!(
            "UPDATE credit_requests SET status = $3, {audit} WHERE id = $1 AND user_id = $2 AND status = 'pending' RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(request_id)
        .bind(user_id)
        .bind(status)
        .bind(resolution.at)
        .bind(resolution.by)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(request) = request else {
            let existing: Option<CreditRequestStatus> =
                sqlx::query_scalar("SELECT status FROM credit_requests WHERE id = $1 AND user_id = $2")
                    .bind(request_id)
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Ok(match existing {
                Some(status) => ResolveOutcome::AlreadyResolved { status },
                None => ResolveOutcome::NotFound,
            });
        };

        let (balance, entry) = match resolution.decision {
            CreditRequestDecision::Approve => {
                let balance: i64 =
                    sqlx::query_scalar("UPDATE users SET balance = balance + $2, updated_at = $3 WHERE id = $1 RETURNING balance")
                        .bind(user_id)
                        .bind(request.amount)
                        .bind(resolution.at)
                        .fetch_one(&mut *tx)
                        .await?;
                let entry = Self::insert_entry(&mut tx, user_id, CreditEntryKind::Credit, request.amount, &resolution.description).await?;
                (balance, Some(entry))
            }
            CreditRequestDecision::Reject => {
                let balance: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await?;
                (balance, None)
            }
        };

        tx.commit().await?;
        debug!(amount = request.amount, status = %request.status, "Resolved credit request");

        Ok(ResolveOutcome::Resolved { request, balance, entry })
    }

    async fn list_credit_history(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>> {
        self.ensure_user_exists(user_id).await?;
        let entries = sqlx::query_as::<_, CreditEntryDBResponse>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM credit_history WHERE user_id = $1 ORDER BY seq DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn create_generation(&self, user_id: UserId, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse> {
        let generation = sqlx::query_as::<_, GenerationDBResponse>(&format!(
            "INSERT INTO generations (id, user_id, prompt, image_urls, credits) VALUES ($1, $2, $3, $4, $5) RETURNING {GENERATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&request.prompt)
        .bind(&request.image_urls)
        .bind(request.credits)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => DbError::NotFound,
            _ => DbError::from(e),
        })?;
        Ok(generation)
    }

    async fn list_generations(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<GenerationDBResponse>> {
        self.ensure_user_exists(user_id).await?;
        let generations = sqlx::query_as::<_, GenerationDBResponse>(&format!(
            "SELECT {GENERATION_COLUMNS} FROM generations WHERE user_id = $1 AND trashed_at IS NULL ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;
        Ok(generations)
    }

    async fn trash_generation(&self, user_id: UserId, generation_id: GenerationId) -> Result<bool> {
        let result = sqlx::query("UPDATE generations SET trashed_at = NOW() WHERE id = $1 AND user_id = $2 AND trashed_at IS NULL")
            .bind(generation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn stats(&self) -> Result<StatsDBResponse> {
        let stats = sqlx::query_as::<_, StatsDBResponse>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users_total,
                (SELECT COUNT(*) FROM users WHERE role = 'administrator') AS administrators,
                (SELECT COALESCE(SUM(balance), 0) FROM users)::BIGINT AS credits_outstanding,
                (SELECT COALESCE(SUM(amount), 0) FROM credit_history WHERE kind = 'credit')::BIGINT AS credits_approved,
                (SELECT COALESCE(SUM(amount), 0) FROM credit_history WHERE kind = 'debit')::BIGINT AS credits_spent,
                (SELECT COUNT(*) FROM credit_requests WHERE status = 'pending') AS pending_requests,
                (SELECT COALESCE(SUM(amount), 0) FROM credit_requests WHERE status = 'pending')::BIGINT AS pending_credits,
                (SELECT COUNT(*) FROM generations) AS generations_total
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use chrono::Utc;

    async fn create_user(store: &PostgresStore, email: &str, role: Role, balance: i64) -> UserDBResponse {
        store
            .create_user(&UserCreateDBRequest {
                name: "Ann".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
                role,
                initial_balance: balance,
            })
            .await
            .unwrap()
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_concurrent_debits_never_overdraw(pool: PgPool) {
        let store = std::sync::Arc::new(PostgresStore::new(pool));
        let user = create_user(&store, "ann@x.com", Role::Member, 4 * 25).await;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.debit(user.id, 25, "race").await.unwrap() })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), DebitOutcome::Applied { .. }) {
                applied += 1;
            }
        }

        assert_eq!(applied, 4);
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 0);
        assert_eq!(store.list_credit_history(user.id, 0, 100).await.unwrap().len(), 4);
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_approve_twice_credits_once(pool: PgPool) {
        let store = PostgresStore::new(pool);
        let user = create_user(&store, "ann@x.com", Role::Member, 100).await;
        let admin = create_user(&store, "admin@x.com", Role::Administrator, 0).await;
        let request = store.create_credit_request(user.id, 200).await.unwrap();

        let resolution = CreditRequestResolution {
            decision: CreditRequestDecision::Approve,
            by: admin.id,
            at: Utc::now(),
            description: "approved".to_string(),
        };

        let first = store.resolve_credit_request(user.id, request.id, &resolution).await.unwrap();
        assert!(matches!(first, ResolveOutcome::Resolved { balance: 300, entry: Some(_), .. }));

        let second = store.resolve_credit_request(user.id, request.id, &resolution).await.unwrap();
        assert!(matches!(
            second,
            ResolveOutcome::AlreadyResolved {
                status: CreditRequestStatus::Approved
            }
        ));
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 300);
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_duplicate_email_is_unique_violation(pool: PgPool) {
        let store = PostgresStore::new(pool);
        create_user(&store, "ann@x.com", Role::Member, 100).await;

        let err = store
            .create_user(&UserCreateDBRequest {
                name: "Other".to_string(),
                email: "ann@x.com".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Member,
                initial_balance: 100,
            })
            .await
            .unwrap_err();
        assert!(err.is_duplicate_email());
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_unknown_user_lists_are_not_found(pool: PgPool) {
        let store = PostgresStore::new(pool);
        let nobody = Uuid::new_v4();

        assert!(matches!(store.list_credit_history(nobody, 0, 10).await, Err(DbError::NotFound)));
        assert!(matches!(store.list_credit_requests(nobody).await, Err(DbError::NotFound)));
        assert!(matches!(store.list_generations(nobody, 0, 10).await, Err(DbError::NotFound)));

        // A known user with nothing recorded gets empty lists
        let user = create_user(&store, "ann@x.com", Role::Member, 100).await;
        assert!(store.list_credit_history(user.id, 0, 10).await.unwrap().is_empty());
        assert!(store.list_credit_requests(user.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_generations_and_stats(pool: PgPool) {
        let store = PostgresStore::new(pool);
        let user = create_user(&store, "ann@x.com", Role::Member, 100).await;
        store.debit(user.id, 1, "Sticker generation").await.unwrap();
        let generation = store
            .create_generation(
                user.id,
                &GenerationCreateDBRequest {
                    prompt: "cat".to_string(),
                    image_urls: vec!["https://cdn.example.com/cat.webp".to_string()],
                    credits: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(generation.image_urls.len(), 1);

        assert!(store.trash_generation(user.id, generation.id).await.unwrap());
        assert!(!store.trash_generation(user.id, generation.id).await.unwrap());
        assert!(store.list_generations(user.id, 0, 10).await.unwrap().is_empty());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.users_total, 1);
        assert_eq!(stats.credits_outstanding, 99);
        assert_eq!(stats.credits_spent, 1);
        assert_eq!(stats.generations_total, 1);
    }
}
