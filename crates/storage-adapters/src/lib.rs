//! # storage-adapters
//!
//! Implementations of the repository ports in `domains`.
//!
//! * [`MemoryStore`]: every table behind one lock; used by tests and by
//!   `storage.backend = "memory"`.
//! * `PgStore` (feature `db-postgres`): PostgreSQL through a sqlx pool, with
//!   posts keeping their materialized path in a `BIGINT[]` column.

pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;
