//! Bazaar Store: SQLite-backed document collections for products and comments.
//!
//! Products are upserted by id; comments are replaced per product set.
//! Structural validation runs inside SQLite (CHECK constraints and triggers),
//! independent of the field checks done during transform.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::*;
