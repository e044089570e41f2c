//! SQLite-backed response store partitioned into named generations.
//!
//! Persistent storage for response snapshots using SQLite with async access
//! via tokio-rusqlite:
//!
//! - Entries keyed by SHA-256 of request method and canonical URL
//! - Whole-generation deletion as the only invalidation mechanism
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use generations::GenerationHandle;
