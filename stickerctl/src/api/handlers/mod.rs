//! HTTP request handlers for all API endpoints.
//!
//! Handlers stay thin: they extract the caller and the payload, call into
//! [`crate::auth::accounts::Accounts`] or [`crate::ledger::Ledger`], and map the result to a
//! response. Business rules live in those services.
//!
//! # Handler Modules
//!
//! - [`admin`]: system statistics
//! - [`auth`]: registration, login, logout and password changes
//! - [`credits`]: credit history, top-up requests and the approval queue
//! - [`generations`]: paid sticker generation and the user's stored generations
//! - [`users`]: the current user's profile and admin user management
//!
//! # Authentication
//!
//! Authenticated handlers take a [`CurrentUser`](crate::api::models::users::CurrentUser)
//! argument, resolved from the session cookie or bearer token. Admin-only handlers either take
//! [`RequiresRole`](crate::auth::permissions::RequiresRole) or delegate the role check to the
//! service they call.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts into a status code and a
//! `{ "kind", "message" }` JSON body.

pub mod admin;
pub mod auth;
pub mod credits;
pub mod generations;
pub mod users;
