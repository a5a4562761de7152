//! Credit history, top-up requests and the administrator approval queue.

use axum::{extract::State, http::StatusCode};

use crate::{
    AppState,
    api::extractors::{Json, Path, Query},
    api::models::{
        credits::{CreditEntryResponse, CreditRequestResolvedResponse, CreditRequestResponse, PendingCreditRequestResponse, TopUpCreate},
        pagination::Pagination,
        users::CurrentUser,
    },
    errors::Result,
    ledger::{Ledger, ResolvedRequest},
    types::{CreditRequestId, UserId},
};

fn resolved_response(resolved: ResolvedRequest) -> CreditRequestResolvedResponse {
    CreditRequestResolvedResponse {
        request: resolved.request.into(),
        balance: resolved.balance,
    }
}

/// List the authenticated user's credit history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/users/current/credits/history",
    tag = "credits",
    params(Pagination),
    responses(
        (status = 200, description = "Credit history", body = [CreditEntryResponse]),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_credit_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<CreditEntryResponse>>> {
    let (skip, limit) = pagination.params();
    let entries = Ledger::new(state.store.as_ref(), &state.config.credits)
        .history(current_user.id, skip, limit)
        .await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// List the authenticated user's top-up requests, newest first
#[utoipa::path(
    get,
    path = "/api/v1/users/current/credits/requests",
    tag = "credits",
    responses(
        (status = 200, description = "Top-up requests", body = [CreditRequestResponse]),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_own_credit_requests(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<Vec<CreditRequestResponse>>> {
    let requests = Ledger::new(state.store.as_ref(), &state.config.credits)
        .requests(current_user.id)
        .await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

/// Ask for more credits. The request stays pending until an administrator resolves it.
#[utoipa::path(
    post,
    path = "/api/v1/users/current/credits/requests",
    request_body = TopUpCreate,
    tag = "credits",
    responses(
        (status = 201, description = "Pending top-up request", body = CreditRequestResponse),
        (status = 400, description = "Amount outside the allowed bounds"),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_credit_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<TopUpCreate>,
) -> Result<(StatusCode, Json<CreditRequestResponse>)> {
    let created = Ledger::new(state.store.as_ref(), &state.config.credits)
        .request_top_up(current_user.id, request.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// List pending top-up requests across all users, oldest first (administrators only)
#[utoipa::path(
    get,
    path = "/api/v1/credits/requests",
    tag = "credits",
    responses(
        (status = 200, description = "Pending requests", body = [PendingCreditRequestResponse]),
        (status = 403, description = "Administrator role required"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_pending_credit_requests(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<Vec<PendingCreditRequestResponse>>> {
    let pending = Ledger::new(state.store.as_ref(), &state.config.credits)
        .list_pending_requests(&current_user)
        .await?;
    Ok(Json(pending.into_iter().map(Into::into).collect()))
}

/// Approve a pending top-up request, crediting the owner (administrators only)
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/credits/requests/{request_id}/approve",
    tag = "credits",
    params(
        ("user_id" = uuid::Uuid, Path, description = "Owner of the request"),
        ("request_id" = uuid::Uuid, Path, description = "Request ID"),
    ),
    responses(
        (status = 200, description = "Request approved", body = CreditRequestResolvedResponse),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "No such request for this user"),
        (status = 409, description = "Request already approved or rejected"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn approve_credit_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((user_id, request_id)): Path<(UserId, CreditRequestId)>,
) -> Result<Json<CreditRequestResolvedResponse>> {
    let resolved = Ledger::new(state.store.as_ref(), &state.config.credits)
        .approve_request(&current_user, user_id, request_id)
        .await?;
    Ok(Json(resolved_response(resolved)))
}

/// Reject a pending top-up request (administrators only)
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/credits/requests/{request_id}/reject",
    tag = "credits",
    params(
        ("user_id" = uuid::Uuid, Path, description = "Owner of the request"),
        ("request_id" = uuid::Uuid, Path, description = "Request ID"),
    ),
    responses(
        (status = 200, description = "Request rejected", body = CreditRequestResolvedResponse),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "No such request for this user"),
        (status = 409, description = "Request already approved or rejected"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reject_credit_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((user_id, request_id)): Path<(UserId, CreditRequestId)>,
) -> Result<Json<CreditRequestResolvedResponse>> {
    let resolved = Ledger::new(state.store.as_ref(), &state.config.credits)
        .reject_request(&current_user, user_id, request_id)
        .await?;
    Ok(Json(resolved_response(resolved)))
}
