//! Incremental sync of configured projects.
//!
//! One pass per project: mirror the repository, read commits after the
//! stored cursor, score each commit's diff, and persist commits and the new
//! cursor together. Progress and failures go through a [`Notifier`].

pub mod locks;
pub mod notifier;
pub mod orchestrator;

pub use locks::ProjectLocks;
pub use notifier::{Notifier, NotifierEvent, NullNotifier, RecordingNotifier};
pub use orchestrator::{PassSummary, ProjectOutcome, SyncOptions, SyncOrchestrator, SyncReport};
