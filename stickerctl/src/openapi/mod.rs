//! OpenAPI documentation for the HTTP API.
//!
//! The document is served as JSON at `/api-docs/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::{
    handlers,
    models::{admin, auth, credits, generations, users},
};
use crate::db::models::credits::{CreditEntryKind, CreditRequestStatus};
use crate::generation::{GenerationOutput, GenerationRequest};

/// Session credentials: the login cookie or the same token as a bearer header.
struct SessionSecurityAddon;

impl Modify for SessionSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned by `POST /authentication/login`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("token"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "stickerctl",
        description = "Accounts, sessions and the credit ledger for sticker generation."
    ),
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::change_password,
        handlers::users::get_current_user,
        handlers::users::update_current_user,
        handlers::users::list_users,
        handlers::users::update_user_role,
        handlers::credits::list_credit_history,
        handlers::credits::list_own_credit_requests,
        handlers::credits::create_credit_request,
        handlers::credits::list_pending_credit_requests,
        handlers::credits::approve_credit_request,
        handlers::credits::reject_credit_request,
        handlers::generations::create_generation,
        handlers::generations::list_generations,
        handlers::generations::trash_generation,
        handlers::admin::get_stats,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::AuthResponse,
        auth::AuthSuccessResponse,
        auth::ChangePasswordRequest,
        users::UserResponse,
        users::ProfileUpdate,
        users::RoleUpdate,
        users::Role,
        credits::TopUpCreate,
        credits::CreditEntryResponse,
        credits::CreditRequestResponse,
        credits::PendingCreditRequestResponse,
        credits::CreditRequestResolvedResponse,
        generations::GenerationResponse,
        generations::GenerationRecordResponse,
        admin::StatsResponse,
        admin::UserStats,
        admin::CreditStats,
        admin::GenerationStats,
        CreditEntryKind,
        CreditRequestStatus,
        GenerationRequest,
        GenerationOutput,
    )),
    modifiers(&SessionSecurityAddon),
    security(("BearerAuth" = []), ("CookieAuth" = [])),
    tags(
        (name = "authentication", description = "Registration, login and sessions"),
        (name = "users", description = "Profiles and user administration"),
        (name = "credits", description = "Credit history and top-up requests"),
        (name = "generations", description = "Paid sticker generation and stored generations"),
        (name = "admin", description = "System statistics"),
    )
)]
pub struct ApiDoc;
