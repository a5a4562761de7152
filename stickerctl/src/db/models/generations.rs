//! Store models for generation records.

use crate::types::{GenerationId, UserId};
use chrono::{DateTime, Utc};

/// Store request for recording a paid generation
#[derive(Debug, Clone)]
pub struct GenerationCreateDBRequest {
    pub prompt: String,
    pub image_urls: Vec<String>,
    /// Credits charged for it
    pub credits: i64,
}

/// A generation the user paid for. Trashed records stay stored but are no longer listed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenerationDBResponse {
    pub id: GenerationId,
    pub user_id: UserId,
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
    pub trashed_at: Option<DateTime<Utc>>,
}
