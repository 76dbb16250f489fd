//! Core types, configuration, and error handling for deckard.
//!
//! This crate provides the shared foundation used by all other deckard crates:
//! - [`DeckardError`]: unified error type using `thiserror`
//! - [`DeckardConfig`]: configuration loaded from `deckard.toml`
//! - Shared types: [`Project`], [`Commit`], [`CommitState`], [`Diff`],
//!   [`NumStat`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{DeckardConfig, ProjectConfig, ScoringConfig};
pub use error::DeckardError;
pub use types::{
    repo_base_name, Commit, CommitState, Diff, NumStat, OutputFormat, Project, RawCommit,
};

/// A convenience `Result` type for deckard operations.
pub type Result<T> = std::result::Result<T, DeckardError>;
