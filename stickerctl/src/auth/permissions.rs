//! Role gate for privileged operations.
//!
//! Use [`require_role`] inside services, or take [`RequiresRole`] as a handler argument to reject
//! the request before the handler body runs:
//!
//! ```ignore
//! async fn list_everything(RequiresRole(admin, ..): RequiresRole<role::Administrator>) -> ... { }
//! ```

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    errors::{Error, Result},
};

/// Fail with `Forbidden` unless `user` holds exactly `role`.
pub fn require_role(user: &CurrentUser, role: Role) -> Result<()> {
    if user.role == role {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.id, required = %role, actual = %user.role, "Role check failed");
        Err(Error::Forbidden)
    }
}

/// Type-level role markers for [`RequiresRole`].
pub mod role {
    use crate::api::models::users::Role;

    pub trait RoleMarker: Send + Sync + 'static {
        const ROLE: Role;
    }

    pub struct Administrator;

    impl RoleMarker for Administrator {
        const ROLE: Role = Role::Administrator;
    }
}

/// Extractor yielding the current user only if they hold role `R`.
pub struct RequiresRole<R: role::RoleMarker>(pub CurrentUser, PhantomData<R>);

impl<R: role::RoleMarker> RequiresRole<R> {
    pub fn user(&self) -> &CurrentUser {
        &self.0
    }
}

impl<R: role::RoleMarker> FromRequestParts<AppState> for RequiresRole<R> {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        require_role(&user, R::ROLE)?;
        Ok(RequiresRole(user, PhantomData))
    }
}
