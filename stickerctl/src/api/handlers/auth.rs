use axum::extract::State;

use crate::{
    AppState,
    api::extractors::Json,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, ChangePasswordRequest, LoginRequest, LoginResponse, LogoutResponse, RegisterRequest,
            RegisterResponse,
        },
        users::{CurrentUser, UserResponse},
    },
    auth::{accounts::Accounts, session},
    errors::Error,
};

/// Register a new user account
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let accounts = Accounts::new(state.store.as_ref(), &state.config);
    let user = accounts.register(&request.name, &request.email, &request.password).await?;

    // Registration logs the user straight in
    let token = session::create_session_token(user.id, &state.config)?;
    let cookie = session::session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: UserResponse::from(user),
        token: Some(token),
        message: "Registration successful".to_string(),
    };

    Ok(RegisterResponse { auth_response, cookie })
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid email or password"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    let accounts = Accounts::new(state.store.as_ref(), &state.config);
    let (user, token) = accounts.authenticate(&request.email, &request.password).await?;
    let cookie = session::session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: UserResponse::from(user),
        token: Some(token),
        message: "Login successful".to_string(),
    };

    Ok(LoginResponse { auth_response, cookie })
}

/// Logout (clear session cookie)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    let cookie = session::expired_session_cookie(&state.config);

    let auth_response = AuthSuccessResponse {
        message: "Logout successful".to_string(),
    };

    Ok(LogoutResponse { auth_response, cookie })
}

/// Change password for the authenticated user
#[utoipa::path(
    post,
    path = "/authentication/password-change",
    request_body = ChangePasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password changed", body = AuthSuccessResponse),
        (status = 400, description = "New password does not meet the rules"),
        (status = 401, description = "Not authenticated or current password is wrong"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    Accounts::new(state.store.as_ref(), &state.config)
        .change_password(current_user.id, &request.current_password, &request.new_password)
        .await?;

    Ok(Json(AuthSuccessResponse {
        message: "Password changed successfully".to_string(),
    }))
}
