//! Persistence layer.
//!
//! Services never talk to a database directly. They hold an `Arc<dyn Store>` and the
//! backend is picked at startup from [`crate::config::DatabaseConfig`]:
//!
//! ```text
//! ┌──────────────────┐
//! │ Accounts, Ledger │
//! └────────┬─────────┘
//!          │ Arc<dyn Store>
//!     ┌────┴─────┐
//!     ↓          ↓
//! ┌────────┐ ┌──────────┐
//! │ Memory │ │ Postgres │
//! └────────┘ └──────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: the [`Store`](handlers::Store) trait and its implementations
//! - [`models`]: records passed to and returned from the store
//! - [`errors`]: store error types

pub mod errors;
pub mod handlers;
pub mod models;
