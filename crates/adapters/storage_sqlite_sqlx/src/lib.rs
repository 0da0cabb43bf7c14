//! # hkbridge-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `EntityRegistry` port defined in `hkbridge-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between registry records and database rows
//!
//! ## Dependency rule
//! Depends on `hkbridge-app` (for port traits) and `hkbridge-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;
pub mod registry_repo;

pub use pool::Config;
pub use registry_repo::SqliteEntityRegistry;
