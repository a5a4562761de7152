//! Account lifecycle: registration, credential checks, session resolution and profile changes.

use tracing::{debug, info, instrument};

use crate::{
    api::models::users::{CurrentUser, ProfileUpdate, Role},
    auth::{password, password::Argon2Params, session},
    config::Config,
    db::{
        errors::DbError,
        handlers::Store,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

/// Account operations over an injected store.
pub struct Accounts<'a> {
    store: &'a dyn Store,
    config: &'a Config,
}

/// Trim and lowercase an email, rejecting anything that is obviously not an address.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let invalid = || Error::BadRequest {
        message: "A valid email address is required".to_string(),
    };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let domain_ok = domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(email)
}

fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Name cannot be empty".to_string(),
        });
    }
    Ok(name.to_string())
}

fn map_duplicate(err: DbError) -> Error {
    if err.is_duplicate_email() {
        Error::DuplicateIdentity
    } else {
        Error::Database(err)
    }
}

impl<'a> Accounts<'a> {
    pub fn new(store: &'a dyn Store, config: &'a Config) -> Self {
        Self { store, config }
    }

    fn argon2_params(&self) -> Argon2Params {
        Argon2Params::from(&self.config.auth.password)
    }

    /// Create a member account with the configured starting balance.
    #[instrument(skip_all, err)]
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<UserDBResponse> {
        let name = normalize_name(name)?;
        let email = normalize_email(email)?;
        password::validate(password, &self.config.auth.password)?;

        // Cheap early exit; the store's unique email constraint is what actually decides
        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(Error::DuplicateIdentity);
        }

        let password_hash = password::hash_blocking(password.to_string(), self.argon2_params()).await?;
        let user = self
            .store
            .create_user(&UserCreateDBRequest {
                name,
                email,
                password_hash,
                role: Role::Member,
                initial_balance: self.config.credits.initial_balance,
            })
            .await
            .map_err(map_duplicate)?;

        info!(user_id = %abbrev_uuid(&user.id), "Registered user");
        Ok(user)
    }

    /// Verify credentials and mint a session token.
    ///
    /// Unknown emails and wrong passwords fail identically.
    #[instrument(skip_all, err)]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(UserDBResponse, String)> {
        let user = match normalize_email(email) {
            Ok(email) => self.store.get_user_by_email(&email).await?,
            Err(_) => None,
        };
        let Some(user) = user else {
            // Same Argon2 cost as a wrong password, so response time does not reveal registered emails
            password::verify_dummy_blocking(password.to_string(), self.argon2_params()).await?;
            debug!("Login for unknown email");
            return Err(Error::InvalidCredentials);
        };

        if !password::verify_blocking(password.to_string(), user.password_hash.clone()).await? {
            debug!(user_id = %abbrev_uuid(&user.id), "Login with wrong password");
            return Err(Error::InvalidCredentials);
        }

        let token = session::create_session_token(user.id, self.config)?;
        Ok((user, token))
    }

    /// Resolve a session token to the current user, re-read from the store.
    pub async fn resolve(&self, token: &str) -> Result<CurrentUser> {
        let claims = session::verify_session_token(token, self.config)?;
        let user = self.store.get_user(claims.sub).await?.ok_or_else(|| Error::Unauthenticated {
            message: Some("Account no longer exists".to_string()),
        })?;
        Ok(user.into())
    }

    /// Change the caller's display name and/or email.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> Result<UserDBResponse> {
        let request = UserUpdateDBRequest {
            name: update.name.as_deref().map(normalize_name).transpose()?,
            email: update.email.as_deref().map(normalize_email).transpose()?,
            ..Default::default()
        };
        self.store.update_user(user_id, &request).await.map_err(map_duplicate)
    }

    /// Replace the caller's password after verifying the current one.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn change_password(&self, user_id: UserId, current: &str, new: &str) -> Result<()> {
        let user = self.store.get_user(user_id).await?.ok_or_else(|| Error::Unauthenticated { message: None })?;

        if !password::verify_blocking(current.to_string(), user.password_hash).await? {
            return Err(Error::InvalidCredentials);
        }
        password::validate(new, &self.config.auth.password)?;

        let password_hash = password::hash_blocking(new.to_string(), self.argon2_params()).await?;
        self.store
            .update_user(
                user_id,
                &UserUpdateDBRequest {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    pub async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<UserDBResponse>> {
        Ok(self.store.list_users(skip, limit).await?)
    }

    /// Set another user's role.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id), role = %role), err)]
    pub async fn set_role(&self, user_id: UserId, role: Role) -> Result<UserDBResponse> {
        let request = UserUpdateDBRequest {
            role: Some(role),
            ..Default::default()
        };
        self.store.update_user(user_id, &request).await.map_err(|e| match e {
            DbError::NotFound => Error::NotFound {
                resource: "User".to_string(),
                id: user_id.to_string(),
            },
            other => Error::Database(other),
        })
    }

    /// Create the administrator account, or refresh its password and role if it already exists.
    #[instrument(skip_all, err)]
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<UserId> {
        let email = normalize_email(email)?;
        let password_hash = password::hash_blocking(password.to_string(), self.argon2_params()).await?;

        if let Some(existing) = self.store.get_user_by_email(&email).await? {
            let request = UserUpdateDBRequest {
                role: Some(Role::Administrator),
                password_hash: Some(password_hash),
                ..Default::default()
            };
            self.store.update_user(existing.id, &request).await?;
            return Ok(existing.id);
        }

        let name = email.split('@').next().unwrap_or("admin").to_string();
        let user = self
            .store
            .create_user(&UserCreateDBRequest {
                name,
                email,
                password_hash,
                role: Role::Administrator,
                initial_balance: 0,
            })
            .await?;
        info!(user_id = %abbrev_uuid(&user.id), "Created initial administrator");
        Ok(user.id)
    }
}
