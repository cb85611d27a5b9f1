//! Cairn persistence layer
//!
//! The `FileRepository` trait and its two implementations: Postgres (sqlx, with
//! embedded migrations) and an in-memory store with the same semantics.

pub mod memory;
pub mod postgres;
pub mod repository;
pub mod transaction;

pub use memory::InMemoryFileRepository;
pub use postgres::{connect, run_migrations, PgFileRepository};
pub use repository::{FileRepository, InsertOutcome};
pub use transaction::TransactionGuard;
