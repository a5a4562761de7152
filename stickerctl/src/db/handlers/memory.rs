//! In-process [`Store`] backed by [`DashMap`].
//!
//! Each user is one document holding its credit history and top-up requests, so every
//! balance-mutating operation runs under the single shard write lock of `users.get_mut`.
//! The email index is a second map; it is always locked on its own and released before
//! a user document is touched, so the two maps never lock each other.

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
    api::models::users::Role,
    types::{CreditRequestId, GenerationId, UserId, abbrev_uuid},
};
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct UserDocument {
    user: UserDBResponse,
    /// Oldest first; served newest first
    history: Vec<CreditEntryDBResponse>,
    requests: Vec<CreditRequestDBResponse>,
    /// Oldest first, trashed ones included
    generations: Vec<GenerationDBResponse>,
}

impl UserDocument {
    fn append_entry(&mut self, kind: CreditEntryKind, amount: i64, description: &str) -> CreditEntryDBResponse {
        let entry = CreditEntryDBResponse {
            id: Uuid::new_v4(),
            user_id: self.user.id,
            kind,
            amount,
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.history.push(entry.clone());
        entry
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: DashMap<UserId, UserDocument>,
    emails: DashMap<String, UserId>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `email` for `owner`. Succeeds if it is free or already owned by `owner`.
    fn claim_email(&self, email: &str, owner: UserId) -> Result<()> {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(existing) if *existing.get() != owner => Err(DbError::duplicate_email(email)),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(owner);
                Ok(())
            }
        }
    }

    fn release_email(&self, email: &str, owner: UserId) {
        self.emails.remove_if(email, |_, id| *id == owner);
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let id = Uuid::new_v4();
        self.claim_email(&request.email, id)?;

        let now = Utc::now();
        let user = UserDBResponse {
            id,
            name: request.name.clone(),
            email: request.email.clone(),
            password_hash: request.password_hash.clone(),
            role: request.role,
            balance: request.initial_balance,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(
            id,
            UserDocument {
                user: user.clone(),
                history: Vec::new(),
                requests: Vec::new(),
                generations: Vec::new(),
            },
        );
        debug!(user_id = %abbrev_uuid(&id), "Created user");
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.users.get(&id).map(|doc| doc.user.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        self.get_user(id).await
    }

    async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<UserDBResponse>> {
        let mut users: Vec<UserDBResponse> = self.users.iter().map(|doc| doc.user.clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        if let Some(email) = &request.email {
            self.claim_email(email, id)?;
        }

        let Some(mut doc) = self.users.get_mut(&id) else {
            if let Some(email) = &request.email {
                self.release_email(email, id);
            }
            return Err(DbError::NotFound);
        };

        let previous_email = doc.user.email.clone();
        if let Some(name) = &request.name {
            doc.user.name = name.clone();
        }
        if let Some(email) = &request.email {
            doc.user.email = email.clone();
        }
        if let Some(role) = request.role {
            doc.user.role = role;
        }
        if let Some(hash) = &request.password_hash {
            doc.user.password_hash = hash.clone();
        }
        doc.user.updated_at = Utc::now();
        let user = doc.user.clone();
        drop(doc);

        if user.email != previous_email {
            self.release_email(&previous_email, id);
        }
        Ok(user)
    }

    #[instrument(skip(self, description), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn debit(&self, user_id: UserId, amount: i64, description: &str) -> Result<DebitOutcome> {
        let mut doc = self.users.get_mut(&user_id).ok_or(DbError::NotFound)?;

        if doc.user.balance < amount {
            return Ok(DebitOutcome::Insufficient { balance: doc.user.balance });
        }

        doc.user.balance -= amount;
        doc.user.updated_at = Utc::now();
        let entry = doc.append_entry(CreditEntryKind::Debit, amount, description);
        Ok(DebitOutcome::Applied {
            balance: doc.user.balance,
            entry,
        })
    }

    async fn create_credit_request(&self, user_id: UserId, amount: i64) -> Result<CreditRequestDBResponse> {
        let mut doc = self.users.get_mut(&user_id).ok_or(DbError::NotFound)?;
        let request = CreditRequestDBResponse::pending(user_id, amount, Utc::now());
        doc.requests.push(request.clone());
        Ok(request)
    }

    async fn list_credit_requests(&self, user_id: UserId) -> Result<Vec<CreditRequestDBResponse>> {
        let doc = self.users.get(&user_id).ok_or(DbError::NotFound)?;
        Ok(doc.requests.iter().rev().cloned().collect())
    }

    async fn list_pending_credit_requests(&self) -> Result<Vec<PendingCreditRequestDBResponse>> {
        let mut pending: Vec<PendingCreditRequestDBResponse> = self
            .users
            .iter()
            .flat_map(|doc| {
                doc.requests
                    .iter()
                    .filter(|r| r.status == CreditRequestStatus::Pending)
                    .map(|r| PendingCreditRequestDBResponse {
                        request: r.clone(),
                        user_name: doc.user.name.clone(),
                        user_email: doc.user.email.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        pending.sort_by(|a, b| a.request.requested_at.cmp(&b.request.requested_at));
        Ok(pending)
    }

    #[instrument(skip(self, resolution), fields(user_id = %abbrev_uuid(&user_id), request_id = %abbrev_uuid(&request_id)), err)]
    async fn resolve_credit_request(
        &self,
        user_id: UserId,
        request_id: CreditRequestId,
        resolution: &CreditRequestResolution,
    ) -> Result<ResolveOutcome> {
        let Some(mut doc) = self.users.get_mut(&user_id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        let Some(index) = doc.requests.iter().position(|r| r.id == request_id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        let status = doc.requests[index].status;
        if status != CreditRequestStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved { status });
        }

        doc.requests[index].resolve(resolution);
        let request = doc.requests[index].clone();

        let entry = match resolution.decision {
            CreditRequestDecision::Approve => {
                doc.user.balance += request.amount;
                doc.user.updated_at = resolution.at;
                Some(doc.append_entry(CreditEntryKind::Credit, request.amount, &resolution.description))
            }
            CreditRequestDecision::Reject => None,
        };

        Ok(ResolveOutcome::Resolved {
            request,
            balance: doc.user.balance,
            entry,
        })
    }

    async fn list_credit_history(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>> {
        let doc = self.users.get(&user_id).ok_or(DbError::NotFound)?;
        Ok(doc
            .history
            .iter()
            .rev()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_generation(&self, user_id: UserId, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse> {
        let mut doc = self.users.get_mut(&user_id).ok_or(DbError::NotFound)?;
        let generation = GenerationDBResponse {
            id: Uuid::new_v4(),
            user_id,
            prompt: request.prompt.clone(),
            image_urls: request.image_urls.clone(),
            credits: request.credits,
            created_at: Utc::now(),
            trashed_at: None,
        };
        doc.generations.push(generation.clone());
        Ok(generation)
    }

    async fn list_generations(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<GenerationDBResponse>> {
        let doc = self.users.get(&user_id).ok_or(DbError::NotFound)?;
        Ok(doc
            .generations
            .iter()
            .rev()
            .filter(|g| g.trashed_at.is_none())
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn trash_generation(&self, user_id: UserId, generation_id: GenerationId) -> Result<bool> {
        let Some(mut doc) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };
        match doc.generations.iter_mut().find(|g| g.id == generation_id && g.trashed_at.is_none()) {
            Some(generation) => {
                generation.trashed_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stats(&self) -> Result<StatsDBResponse> {
        let mut stats = StatsDBResponse::default();
        for doc in self.users.iter() {
            stats.users_total += 1;
            if doc.user.role == Role::Administrator {
                stats.administrators += 1;
            }
            stats.credits_outstanding += doc.user.balance;
            for entry in &doc.history {
                match entry.kind {
                    CreditEntryKind::Credit => stats.credits_approved += entry.amount,
                    CreditEntryKind::Debit => stats.credits_spent += entry.amount,
                }
            }
            for request in doc.requests.iter().filter(|r| r.status == CreditRequestStatus::Pending) {
                stats.pending_requests += 1;
                stats.pending_credits += request.amount;
            }
            stats.generations_total += doc.generations.len() as i64;
        }
        Ok(stats)
    }
}
