//! Mirroring and history retrieval through the external `git` tool.
//!
//! [`gateway::GitGateway`] clones or pulls each project's working copy and
//! runs `git log` / `git diff --numstat` with a per-invocation timeout.
//! [`log::parse_log`] turns the NUL-delimited log output into commit records.

pub mod gateway;
pub mod log;

pub use gateway::{GitGateway, RepoAction, VcsGateway};
