//! Store implementations.
//!
//! - [`repository`]: the [`Store`] trait every backend implements
//! - [`memory`]: [`InMemoryStore`], a `DashMap` document store used by default and in tests
//! - [`postgres`]: [`PostgresStore`], the sqlx-backed production store

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::Store;
