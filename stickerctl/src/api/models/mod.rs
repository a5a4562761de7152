//! API request and response data models.
//!
//! These types define the public JSON contract and are kept separate from the store models in
//! [`crate::db::models`], so storage can change without breaking clients. All of them derive
//! `utoipa::ToSchema` for the generated OpenAPI document.
//!
//! - [`admin`]: system statistics
//! - [`auth`]: login, registration and password payloads
//! - [`credits`]: history entries, top-up requests and the admin queue
//! - [`generations`]: paid generation results and the user's stored generations
//! - [`pagination`]: `skip`/`limit` query parameters
//! - [`users`]: user profiles, roles and the authenticated user

pub mod admin;
pub mod auth;
pub mod credits;
pub mod generations;
pub mod pagination;
pub mod users;
