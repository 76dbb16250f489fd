//! Persistence of ingested commits and per-project fetch cursors.
//!
//! [`store::CommitStore`] is the contract the sync pipeline writes through;
//! [`store::SqliteStore`] implements it on an embedded SQLite database.

pub mod store;

pub use store::{CommitFilter, CommitStore, ProjectStats, SqliteStore};
