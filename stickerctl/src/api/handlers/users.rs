use axum::extract::State;

use crate::{
    AppState,
    api::extractors::{Json, Path, Query},
    api::models::{
        pagination::Pagination,
        users::{CurrentUser, ProfileUpdate, RoleUpdate, UserResponse},
    },
    auth::{
        accounts::Accounts,
        permissions::{RequiresRole, role},
    },
    errors::{Error, Result},
    types::UserId,
};

/// Get the authenticated user, with their current balance
#[utoipa::path(
    get,
    path = "/api/v1/users/current",
    tag = "users",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_user(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>> {
    let user = state.store.get_user(current_user.id).await?.ok_or(Error::Unauthenticated { message: None })?;
    Ok(Json(user.into()))
}

/// Update the authenticated user's name and/or email
#[utoipa::path(
    patch,
    path = "/api/v1/users/current",
    request_body = ProfileUpdate,
    tag = "users",
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_current_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserResponse>> {
    let user = Accounts::new(state.store.as_ref(), &state.config)
        .update_profile(current_user.id, &update)
        .await?;
    Ok(Json(user.into()))
}

/// List all users (administrators only)
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(Pagination),
    responses(
        (status = 200, description = "Users, newest first", body = [UserResponse]),
        (status = 403, description = "Administrator role required"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: RequiresRole<role::Administrator>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<UserResponse>>> {
    let (skip, limit) = pagination.params();
    let users = Accounts::new(state.store.as_ref(), &state.config).list_users(skip, limit).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Change a user's role (administrators only)
#[utoipa::path(
    patch,
    path = "/api/v1/users/{user_id}",
    request_body = RoleUpdate,
    tag = "users",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user_role(
    State(state): State<AppState>,
    _admin: RequiresRole<role::Administrator>,
    Path(user_id): Path<UserId>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<UserResponse>> {
    let user = Accounts::new(state.store.as_ref(), &state.config).set_role(user_id, update.role).await?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::users::{Role, UserResponse};
    use crate::test_utils::{create_test_admin, create_test_config, create_test_server, create_test_state, create_test_user};
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_current_user_requires_session() {
        let server = create_test_server(create_test_state(create_test_config()));

        let response = server.get("/api/v1/users/current").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["kind"], "unauthenticated");

        server
            .get("/api/v1/users/current")
            .authorization_bearer("not-a-token")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let state = create_test_state(create_test_config());
        let (_, token) = create_test_user(&state, "ann@x.com").await;
        create_test_user(&state, "bob@x.com").await;
        let server = create_test_server(state);

        let response = server
            .patch("/api/v1/users/current")
            .authorization_bearer(&token)
            .json(&json!({ "name": "Annie" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<UserResponse>().name, "Annie");

        server
            .patch("/api/v1/users/current")
            .authorization_bearer(&token)
            .json(&json!({ "email": "bob@x.com" }))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_user_admin_routes_are_forbidden_to_members() {
        let state = create_test_state(create_test_config());
        let (ann, token) = create_test_user(&state, "ann@x.com").await;
        let server = create_test_server(state);

        let list = server.get("/api/v1/users").authorization_bearer(&token).await;
        list.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(list.json::<Value>()["kind"], "forbidden");

        server
            .patch(&format!("/api/v1/users/{}", ann.id))
            .authorization_bearer(&token)
            .json(&json!({ "role": "administrator" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_lists_users_and_sets_roles() {
        let state = create_test_state(create_test_config());
        let (ann, ann_token) = create_test_user(&state, "ann@x.com").await;
        let (_, admin_token) = create_test_admin(&state).await;
        let server = create_test_server(state);

        let users: Vec<UserResponse> = server
            .get("/api/v1/users")
            .authorization_bearer(&admin_token)
            .add_query_param("limit", 10)
            .await
            .json();
        assert_eq!(users.len(), 2);

        let promoted = server
            .patch(&format!("/api/v1/users/{}", ann.id))
            .authorization_bearer(&admin_token)
            .json(&json!({ "role": "administrator" }))
            .await;
        promoted.assert_status_ok();
        assert_eq!(promoted.json::<UserResponse>().role, Role::Administrator);

        // Roles are read fresh on every request, so Ann's existing token now carries admin rights
        server
            .get("/api/v1/users")
            .authorization_bearer(&ann_token)
            .await
            .assert_status_ok();

        server
            .patch(&format!("/api/v1/users/{}", uuid::Uuid::new_v4()))
            .authorization_bearer(&admin_token)
            .json(&json!({ "role": "member" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
