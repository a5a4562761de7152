//! HTTP API: axum handlers and their request/response models.
//!
//! - **Authentication** (`/authentication/*`): registration, login, logout and password changes
//! - **Users** (`/api/v1/users/*`): the current profile and, for administrators, the user list
//! - **Credits** (`/api/v1/users/current/credits/*`, `/api/v1/credits/requests`): history, top-up
//!   requests and the admin approval queue
//! - **Generations** (`/api/v1/generations`, `/api/v1/users/current/generations`): paid sticker
//!   generation and the caller's stored results
//! - **Admin** (`/api/v1/admin/stats`): system statistics
//!
//! Every endpoint is annotated for `utoipa`; the rendered reference lives at `/docs`.

pub mod extractors;
pub mod handlers;
pub mod models;
