//! SQLite persistence for the stockbook sync core.
//!
//! Provides the durable `LocalStore` implementation backing the write buffer
//! and read-through snapshots.

mod kv;

pub use kv::SqliteKvStore;
