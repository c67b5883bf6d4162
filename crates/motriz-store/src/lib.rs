//! # Motriz Store
//!
//! SQLite-backed persistence — survives restarts, safe for concurrent
//! engine replicas. All cross-pass mutual exclusion lives here, in
//! transactions and partial unique indexes, never in process memory.

pub mod sqlite;

pub use sqlite::{DeliveryClaim, SqliteStore};
