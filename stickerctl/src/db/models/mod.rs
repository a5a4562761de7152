//! Store record models.
//!
//! These structs are what [`crate::db::handlers::Store`] implementations accept and return.
//! They derive `sqlx::FromRow` so the Postgres store can map rows directly, and the in-memory
//! store keeps the same structs inside its user documents.
//!
//! - [`users`]: User accounts, credentials, roles and balances
//! - [`credits`]: Credit history entries, top-up requests and the outcomes of atomic ledger
//!   operations
//! - [`generations`]: Records of paid generations
//! - [`stats`]: Aggregate counters for the admin dashboard
//!
//! Store models are distinct from API models; handlers convert with `From` impls:
//!
//! ```ignore
//! use stickerctl::api::models::users::UserResponse;
//!
//! let api_response: UserResponse = db_user.into();
//! ```

pub mod credits;
pub mod generations;
pub mod stats;
pub mod users;
