use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    AppState,
    api::extractors::{Json, Path, Query},
    api::models::{
        generations::{GenerationRecordResponse, GenerationResponse},
        pagination::Pagination,
        users::CurrentUser,
    },
    db::models::generations::GenerationCreateDBRequest,
    errors::{Error, Result},
    generation::GenerationRequest,
    ledger::{ChargeError, Ledger},
    metrics::credits as credit_metrics,
    types::{GenerationId, abbrev_uuid},
};

/// Upper bound on prompt length, in characters
const MAX_PROMPT_CHARS: usize = 2000;

const GENERATION_DESCRIPTION: &str = "Sticker generation";

/// Generate a sticker, charging the configured cost once the provider succeeds
#[utoipa::path(
    post,
    path = "/api/v1/generations",
    request_body = GenerationRequest,
    tag = "generations",
    responses(
        (status = 201, description = "Generated and charged", body = GenerationResponse),
        (status = 400, description = "Empty or oversized prompt"),
        (status = 401, description = "Not authenticated"),
        (status = 402, description = "Balance does not cover the cost"),
        (status = 502, description = "Generation provider failed; nothing was charged"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_generation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<GenerationRequest>,
) -> Result<Response> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() || prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(Error::BadRequest {
            message: format!("Prompt must be between 1 and {MAX_PROMPT_CHARS} characters"),
        });
    }
    let request = GenerationRequest { prompt: prompt.to_string() };

    let cost = state.config.credits.generation_cost;
    let ledger = Ledger::new(state.store.as_ref(), &state.config.credits);

    match ledger
        .charge_after(current_user.id, cost, GENERATION_DESCRIPTION, state.generator.generate(&request))
        .await
    {
        Ok(charged) => {
            credit_metrics::record_generation("charged");
            let record = GenerationCreateDBRequest {
                prompt: charged.output.prompt.clone(),
                image_urls: charged.output.image_urls.clone(),
                credits: cost,
            };
            // Already paid for, so a failed write is logged rather than turned into an error response
            let id = match state.store.create_generation(current_user.id, &record).await {
                Ok(stored) => Some(stored.id),
                Err(e) => {
                    tracing::error!(user_id = %abbrev_uuid(&current_user.id), error = %e, "Failed to record paid generation");
                    None
                }
            };
            let body = GenerationResponse {
                id,
                generation: charged.output,
                charged: cost,
                balance: charged.receipt.balance,
                entry: charged.receipt.entry.into(),
            };
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        Err(ChargeError::Rejected(e)) => {
            credit_metrics::record_generation("rejected");
            Err(e)
        }
        Err(ChargeError::Action(e)) => {
            credit_metrics::record_generation("provider_failed");
            Err(e)
        }
        Err(ChargeError::Billing { output, error }) => {
            credit_metrics::record_generation("unbilled");
            // The image exists but could not be paid for; hand it back with the billing error
            let mut body = json!({
                "kind": error.kind(),
                "message": error.user_message(),
                "generation": output,
            });
            if let Error::InsufficientBalance { balance, requested } = &error {
                body["balance"] = json!(balance);
                body["requested"] = json!(requested);
            }
            Ok((error.status_code(), Json(body)).into_response())
        }
    }
}

/// List the caller's stored generations, newest first
#[utoipa::path(
    get,
    path = "/api/v1/users/current/generations",
    tag = "generations",
    params(Pagination),
    responses(
        (status = 200, description = "Stored generations", body = Vec<GenerationRecordResponse>),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_generations(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<GenerationRecordResponse>>> {
    let (skip, limit) = pagination.params();
    let generations = state.store.list_generations(current_user.id, skip, limit).await?;
    Ok(Json(generations.into_iter().map(Into::into).collect()))
}

/// Move one of the caller's generations to the trash
#[utoipa::path(
    delete,
    path = "/api/v1/users/current/generations/{generation_id}",
    tag = "generations",
    params(("generation_id" = uuid::Uuid, Path, description = "Generation ID")),
    responses(
        (status = 204, description = "Trashed"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such generation for this user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn trash_generation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(generation_id): Path<GenerationId>,
) -> Result<StatusCode> {
    if state.store.trash_generation(current_user.id, generation_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Generation".to_string(),
            id: generation_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::models::generations::{GenerationRecordResponse, GenerationResponse};
    use crate::api::models::users::UserResponse;
    use crate::db::models::credits::CreditEntryKind;
    use crate::generation::GenerationError;
    use crate::ledger::Ledger;
    use crate::test_utils::{StubGenerator, create_test_config, create_test_server, create_test_state_with, create_test_user};
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_successful_generation_is_charged_once() {
        let generator = Arc::new(StubGenerator::succeeding("https://cdn.example.com/cat.webp"));
        let state = create_test_state_with(create_test_config(), generator.clone());
        let (_, token) = create_test_user(&state, "ann@x.com").await;
        let server = create_test_server(state);

        let response = server
            .post("/api/v1/generations")
            .authorization_bearer(&token)
            .json(&json!({ "prompt": "  a happy cat " }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: GenerationResponse = response.json();
        assert_eq!(body.generation.image_urls, vec!["https://cdn.example.com/cat.webp"]);
        assert_eq!(body.generation.prompt, "a happy cat");
        assert_eq!(body.charged, 1);
        assert_eq!(body.balance, 99);
        assert_eq!(body.entry.kind, CreditEntryKind::Debit);
        assert!(body.id.is_some());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_charges_nothing() {
        let generator = Arc::new(StubGenerator::failing(|| GenerationError::Failed("NSFW content detected".to_string())));
        let state = create_test_state_with(create_test_config(), generator);
        let (_, token) = create_test_user(&state, "ann@x.com").await;
        let server = create_test_server(state);

        let response = server
            .post("/api/v1/generations")
            .authorization_bearer(&token)
            .json(&json!({ "prompt": "a cat" }))
            .await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(response.json::<Value>()["kind"], "provider_error");

        let me: UserResponse = server.get("/api/v1/users/current").authorization_bearer(&token).await.json();
        assert_eq!(me.balance, 100);
    }

    #[tokio::test]
    async fn test_no_balance_never_calls_provider() {
        let generator = Arc::new(StubGenerator::succeeding("https://cdn.example.com/cat.webp"));
        let state = create_test_state_with(create_test_config(), generator.clone());
        let (ann, token) = create_test_user(&state, "ann@x.com").await;
        Ledger::new(state.store.as_ref(), &state.config.credits)
            .debit(ann.id, 100, "spent elsewhere")
            .await
            .unwrap();
        let server = create_test_server(state);

        let response = server
            .post("/api/v1/generations")
            .authorization_bearer(&token)
            .json(&json!({ "prompt": "a cat" }))
            .await;
        response.assert_status(StatusCode::PAYMENT_REQUIRED);
        let body: Value = response.json();
        assert_eq!(body["kind"], "insufficient_balance");
        assert_eq!(body["balance"], 0);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_billing_failure_returns_generation() {
        let mut config = create_test_config();
        config.credits.generation_cost = 1;
        let generator = Arc::new(StubGenerator::succeeding("https://cdn.example.com/cat.webp"));
        let state = create_test_state_with(config, generator.clone());
        let (ann, token) = create_test_user(&state, "ann@x.com").await;
        // Spend the balance while the provider call is in flight
        generator.drain_balance_on_call(state.store.clone(), ann.id);
        let server = create_test_server(state);

        let response = server
            .post("/api/v1/generations")
            .authorization_bearer(&token)
            .json(&json!({ "prompt": "a cat" }))
            .await;
        response.assert_status(StatusCode::PAYMENT_REQUIRED);
        let body: Value = response.json();
        assert_eq!(body["kind"], "insufficient_balance");
        assert_eq!(body["generation"]["image_urls"][0], "https://cdn.example.com/cat.webp");

        // Unpaid generations are not kept
        let stored: Vec<GenerationRecordResponse> = server
            .get("/api/v1/users/current/generations")
            .authorization_bearer(&token)
            .await
            .json();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_paid_generations_are_stored_and_can_be_trashed() {
        let generator = Arc::new(StubGenerator::succeeding("https://cdn.example.com/cat.webp"));
        let state = create_test_state_with(create_test_config(), generator);
        let (_, ann_token) = create_test_user(&state, "ann@x.com").await;
        let (_, bob_token) = create_test_user(&state, "bob@x.com").await;
        let server = create_test_server(state);

        for prompt in ["a cat", "a dog"] {
            server
                .post("/api/v1/generations")
                .authorization_bearer(&ann_token)
                .json(&json!({ "prompt": prompt }))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let stored: Vec<GenerationRecordResponse> = server
            .get("/api/v1/users/current/generations")
            .authorization_bearer(&ann_token)
            .await
            .json();
        let prompts: Vec<_> = stored.iter().map(|g| g.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["a dog", "a cat"]);
        assert_eq!(stored[0].credits, 1);
        assert_eq!(stored[0].image_urls, vec!["https://cdn.example.com/cat.webp"]);

        let path = format!("/api/v1/users/current/generations/{}", stored[0].id);
        let by_bob = server.delete(&path).authorization_bearer(&bob_token).await;
        by_bob.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(by_bob.json::<Value>()["kind"], "not_found");

        server.delete(&path).authorization_bearer(&ann_token).await.assert_status(StatusCode::NO_CONTENT);
        server.delete(&path).authorization_bearer(&ann_token).await.assert_status(StatusCode::NOT_FOUND);

        let stored: Vec<GenerationRecordResponse> = server
            .get("/api/v1/users/current/generations?limit=10")
            .authorization_bearer(&ann_token)
            .await
            .json();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].prompt, "a cat");

        let bad_id = server
            .delete("/api/v1/users/current/generations/not-a-uuid")
            .authorization_bearer(&ann_token)
            .await;
        bad_id.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(bad_id.json::<Value>()["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let state = create_test_state_with(create_test_config(), Arc::new(StubGenerator::succeeding("x")));
        let (_, token) = create_test_user(&state, "ann@x.com").await;
        let server = create_test_server(state);

        server
            .post("/api/v1/generations")
            .authorization_bearer(&token)
            .json(&json!({ "prompt": "   " }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
