//! Authentication and authorization.
//!
//! Users log in with email and password and receive a signed session token, returned in the
//! response body and set as an HTTP-only cookie. Every authenticated request resolves the token
//! back to a user through one path: the [`CurrentUser`](crate::api::models::users::CurrentUser)
//! extractor in [`current_user`], which accepts either the cookie or `Authorization: Bearer`.
//!
//! Privileged routes add a role check on top with
//! [`RequiresRole`](permissions::RequiresRole) or [`require_role`](permissions::require_role).
//!
//! # Modules
//!
//! - [`accounts`]: registration, login, session resolution and profile changes
//! - [`current_user`]: the authenticated-user extractor
//! - [`password`]: Argon2id hashing and password rules
//! - [`permissions`]: role checks
//! - [`session`]: JWT session tokens and cookies
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use stickerctl::api::models::users::CurrentUser;
//!
//! async fn whoami(current_user: CurrentUser) -> String {
//!     format!("Hello, {}!", current_user.name)
//! }
//! ```

pub mod accounts;
pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
