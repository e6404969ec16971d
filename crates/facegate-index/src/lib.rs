//! facegate-index: file-backed vector index for facegate collections.
//!
//! One SQLite file holds every collection. Only one [`SqliteIndex`] may hold
//! a given file at a time; close it before opening another handle.

mod codec;
mod sqlite;

pub use sqlite::SqliteIndex;
