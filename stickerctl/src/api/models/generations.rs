use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::models::credits::CreditEntryResponse;
use crate::db::models::generations::GenerationDBResponse;
use crate::generation::GenerationOutput;
use crate::types::GenerationId;

/// A paid generation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationResponse {
    /// ID of the stored record. Absent if the charge went through but recording it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub id: Option<GenerationId>,
    pub generation: GenerationOutput,
    /// Credits charged for this generation
    pub charged: i64,
    /// Balance after the charge
    pub balance: i64,
    /// History entry recording the charge
    pub entry: CreditEntryResponse,
}

/// A stored generation in the user's gallery
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationRecordResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GenerationId,
    pub prompt: String,
    pub image_urls: Vec<String>,
    /// Credits charged for it
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}

impl From<GenerationDBResponse> for GenerationRecordResponse {
    fn from(db: GenerationDBResponse) -> Self {
        Self {
            id: db.id,
            prompt: db.prompt,
            image_urls: db.image_urls,
            credits: db.credits,
            created_at: db.created_at,
        }
    }
}
