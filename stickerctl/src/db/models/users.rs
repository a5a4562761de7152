//! Store models for users.

use crate::api::models::users::Role;
use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Store request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub name: String,
    /// Already normalised (trimmed, lowercased)
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub initial_balance: i64,
}

/// Store request for updating a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
}

/// Store response for a user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
