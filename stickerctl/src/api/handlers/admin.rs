//! System statistics for the admin dashboard.

use axum::extract::State;

use crate::{
    AppState,
    api::extractors::Json,
    api::models::{admin::StatsResponse, users::UserResponse},
    auth::permissions::{RequiresRole, role},
    errors::Result,
};

/// Number of newest accounts included in the statistics
const RECENT_USERS: i64 = 5;

/// User, credit and generation totals (administrators only)
#[utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    tag = "admin",
    responses(
        (status = 200, description = "System statistics", body = StatsResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator role required"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_stats(State(state): State<AppState>, _admin: RequiresRole<role::Administrator>) -> Result<Json<StatsResponse>> {
    let stats = state.store.stats().await?;
    let recent_users = state.store.list_users(0, RECENT_USERS).await?;
    Ok(Json(StatsResponse::new(
        stats,
        recent_users.into_iter().map(UserResponse::from).collect(),
    )))
}

#[cfg(test)]
mod tests {
    use crate::api::models::admin::StatsResponse;
    use crate::test_utils::{create_test_admin, create_test_config, create_test_server, create_test_state, create_test_user};
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_stats_are_admin_only() {
        let state = create_test_state(create_test_config());
        let (_, token) = create_test_user(&state, "ann@x.com").await;
        let server = create_test_server(state);

        let response = server.get("/api/v1/admin/stats").authorization_bearer(&token).await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json::<Value>()["kind"], "forbidden");

        server.get("/api/v1/admin/stats").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stats_reflect_ledger_activity() {
        let state = create_test_state(create_test_config());
        let (_, ann_token) = create_test_user(&state, "ann@x.com").await;
        let (_, admin_token) = create_test_admin(&state).await;
        let server = create_test_server(state);

        server
            .post("/api/v1/users/current/credits/requests")
            .authorization_bearer(&ann_token)
            .json(&json!({ "amount": 300 }))
            .await
            .assert_status(StatusCode::CREATED);
        server
            .post("/api/v1/generations")
            .authorization_bearer(&ann_token)
            .json(&json!({ "prompt": "a cat" }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server.get("/api/v1/admin/stats").authorization_bearer(&admin_token).await;
        response.assert_status_ok();
        let stats: StatsResponse = response.json();

        assert_eq!(stats.users.total, 2);
        assert_eq!(stats.users.administrators, 1);
        assert_eq!(stats.users.members, 1);
        assert_eq!(stats.credits.spent, 1);
        assert_eq!(stats.credits.pending_requests, 1);
        assert_eq!(stats.credits.pending_amount, 300);
        assert_eq!(stats.generations.total, 1);
        assert_eq!(stats.recent_users.len(), 2);
    }
}
