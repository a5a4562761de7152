use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::{instrument, trace};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::accounts::Accounts,
    config::Config,
    errors::{Error, Result},
};

/// Pull the session token from `Authorization: Bearer` or, failing that, the session cookie.
fn session_token<'p>(parts: &'p Parts, config: &Config) -> Option<&'p str> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        trace!("Using bearer session token");
        return bearer;
    }

    let cookie_name = &config.auth.session.cookie_name;
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name.as_str() && !value.is_empty())
        .map(|(_, value)| value)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = session_token(parts, &state.config).ok_or(Error::Unauthenticated { message: None })?;
        Accounts::new(state.store.as_ref(), &state.config).resolve(token).await
    }
}
