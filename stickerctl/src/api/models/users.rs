//! API request/response models for users.

use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Platform role. Administrators may list and resolve credit requests and manage users.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Administrator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Administrator => write!(f, "administrator"),
        }
    }
}

/// Profile update for the current user
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Admin update of another user's role
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleUpdate {
    pub role: Role,
}

// User response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Spendable credits
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The authenticated user, always loaded fresh from the store for the current request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub balance: i64,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            role: db.role,
            balance: db.balance,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            role: db.role,
            balance: db.balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Administrator).unwrap(), "\"administrator\"");
        let role: Role = serde_json::from_str("\"member\"").unwrap();
        assert_eq!(role, Role::Member);
        assert_eq!(Role::Administrator.to_string(), "administrator");
    }
}
