use std::path::PathBuf;

/// Errors that can occur across deckard.
///
/// Each variant names one failure domain of the sync pipeline. Library crates
/// use this type directly; the binary reports it through `miette`.
///
/// # Examples
///
/// ```
/// use deckard_core::DeckardError;
///
/// let err = DeckardError::MalformedDiffLine { line: "3\t5".into() };
/// assert!(err.to_string().contains("3\t5"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DeckardError {
    /// Cloning or pulling a project's mirror failed.
    #[error("failed to sync repo for project '{project}': {message}")]
    #[diagnostic(code(deckard::repo_sync))]
    RepoSync { project: String, message: String },

    /// `git log` could not be run or exited non-zero.
    #[error("log retrieval failed in {}: {message}", .folder.display())]
    #[diagnostic(code(deckard::log_retrieval))]
    LogRetrieval { folder: PathBuf, message: String },

    /// `git diff --numstat` exited with anything but success or 128.
    #[error("diff retrieval failed for {hash}: {message}")]
    #[diagnostic(code(deckard::diff_retrieval))]
    DiffRetrieval { hash: String, message: String },

    /// The epoch-seconds field of a log record is not an integer.
    #[error("illegal commit time: {value}, folder = {}", .folder.display())]
    #[diagnostic(
        code(deckard::malformed_timestamp),
        help("the output format of `git log` may have changed")
    )]
    MalformedTimestamp { value: String, folder: PathBuf },

    /// A numstat line has fewer than three tokens.
    #[error("unexpected diff line: {line}")]
    #[diagnostic(code(deckard::malformed_diff_line))]
    MalformedDiffLine { line: String },

    /// The scoring strategy could not produce a score.
    #[error("scoring error: {0}")]
    #[diagnostic(code(deckard::scoring))]
    Scoring(String),

    /// Reading or writing the commit database failed.
    #[error("persistence error: {0}")]
    #[diagnostic(code(deckard::persistence))]
    Persistence(String),

    /// The sync pass was cancelled before this project was persisted.
    #[error("sync cancelled for project '{0}'")]
    #[diagnostic(code(deckard::cancelled))]
    Cancelled(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(deckard::config))]
    Config(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(deckard::io))]
    Io(#[from] std::io::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(deckard::toml))]
    Toml(#[from] toml::de::Error),
}

impl DeckardError {
    /// Whether this error means the project pass was stopped on purpose.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeckardError::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DeckardError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn malformed_timestamp_names_value_and_folder() {
        let err = DeckardError::MalformedTimestamp {
            value: "yesterday".into(),
            folder: PathBuf::from("/code/deckard"),
        };
        let text = err.to_string();
        assert!(text.contains("yesterday"));
        assert!(text.contains("/code/deckard"));
    }

    #[test]
    fn repo_sync_names_project() {
        let err = DeckardError::RepoSync {
            project: "deckard".into(),
            message: "fatal: repository not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to sync repo for project 'deckard': fatal: repository not found"
        );
    }

    #[test]
    fn only_cancelled_is_cancelled() {
        assert!(DeckardError::Cancelled("p".into()).is_cancelled());
        assert!(!DeckardError::Scoring("nan".into()).is_cancelled());
    }
}
