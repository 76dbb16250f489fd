use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured repository and the local folder it is mirrored into.
///
/// # Examples
///
/// ```
/// use deckard_core::Project;
/// use std::path::{Path, PathBuf};
///
/// let prj = Project::new(
///     "deckard",
///     "https://github.com/Ragnaroek/deckard.git",
///     Path::new("/code"),
/// );
/// assert_eq!(prj.folder, PathBuf::from("/code/deckard.git"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Identifier of the project, the key it is configured under.
    pub id: String,
    /// Remote locator passed to `git clone` (URL or path).
    pub repo: String,
    /// Working copy: base name of `repo` joined under the code root.
    pub folder: PathBuf,
}

impl Project {
    /// Build a project, deriving its working-copy folder from `repo`.
    pub fn new(id: impl Into<String>, repo: impl Into<String>, code_folder: &Path) -> Self {
        let repo = repo.into();
        let folder = code_folder.join(repo_base_name(&repo));
        Self {
            id: id.into(),
            repo,
            folder,
        }
    }
}

/// Last path segment of a remote locator, ignoring trailing slashes.
///
/// # Examples
///
/// ```
/// use deckard_core::repo_base_name as base;
///
/// assert_eq!(base("git@github.com:org/tool.git"), "tool.git");
/// assert_eq!(base("/srv/git/tool/"), "tool");
/// ```
pub fn repo_base_name(repo: &str) -> &str {
    let trimmed = repo.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// One record parsed from `git log` output, before orchestration enriches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    /// Full commit hash, whitespace-trimmed.
    pub hash: String,
    pub author_name: String,
    pub committer_name: String,
    /// Commit time (`%ct`), second precision.
    pub commit_when: DateTime<Utc>,
    pub subject: String,
    /// Message body, verbatim including embedded newlines.
    pub message: String,
}

/// Lifecycle state of an ingested commit.
///
/// The sync pipeline only ever creates commits in [`CommitState::New`];
/// other transitions belong to whoever consumes the stored commits.
///
/// # Examples
///
/// ```
/// use deckard_core::CommitState;
///
/// let state: CommitState = "seen".parse().unwrap();
/// assert_eq!(state, CommitState::Seen);
/// assert_eq!(CommitState::default(), CommitState::New);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    /// Freshly ingested, not looked at yet.
    #[default]
    New,
    /// Looked at by the operator.
    Seen,
    /// Explicitly hidden from listings.
    Dismissed,
}

impl CommitState {
    /// Stable string form used in the database and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::New => "new",
            CommitState::Seen => "seen",
            CommitState::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(CommitState::New),
            "seen" => Ok(CommitState::Seen),
            "dismissed" => Ok(CommitState::Dismissed),
            other => Err(format!("unknown commit state: {other}")),
        }
    }
}

/// A commit ingested for a project, with its change-magnitude score.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use deckard_core::{Commit, CommitState, RawCommit};
///
/// let raw = RawCommit {
///     hash: "9fceb02".into(),
///     author_name: "alice".into(),
///     committer_name: "bob".into(),
///     commit_when: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
///     subject: "fix: cursor regression".into(),
///     message: String::new(),
/// };
/// let commit = Commit::from_raw(raw, "deckard", 42.0);
/// assert_eq!(commit.state, CommitState::New);
/// assert_eq!(commit.project, "deckard");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: String,
    pub author_name: String,
    pub committer_name: String,
    pub commit_when: DateTime<Utc>,
    pub subject: String,
    pub message: String,
    /// Id of the owning [`Project`].
    pub project: String,
    pub state: CommitState,
    /// Change magnitude computed from the commit's [`Diff`].
    pub score: f64,
}

impl Commit {
    /// Tag a parsed log record with its project, the initial state, and a score.
    pub fn from_raw(raw: RawCommit, project: impl Into<String>, score: f64) -> Self {
        Self {
            hash: raw.hash,
            author_name: raw.author_name,
            committer_name: raw.committer_name,
            commit_when: raw.commit_when,
            subject: raw.subject,
            message: raw.message,
            project: project.into(),
            state: CommitState::New,
            score,
        }
    }

    /// First seven characters of the hash, for display.
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(7)
            .map_or(self.hash.len(), |(idx, _)| idx);
        &self.hash[..end]
    }
}

/// Added/deleted line counts for one file of a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumStat {
    pub added: u64,
    pub deleted: u64,
    /// Path of the file; empty for an entry whose counts could not be read.
    pub file: String,
}

/// Per-commit change summary relative to the first parent.
///
/// # Examples
///
/// ```
/// use deckard_core::{Diff, NumStat};
///
/// let diff = Diff {
///     stats: vec![NumStat { added: 3, deleted: 5, file: "foo bar.txt".into() }],
/// };
/// assert_eq!(diff.total_changed(), 8);
/// assert!(Diff::default().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub stats: Vec<NumStat>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Sum of added and deleted lines across all files.
    pub fn total_changed(&self) -> u64 {
        self.stats.iter().map(|s| s.added + s.deleted).sum()
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use deckard_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn folder_is_base_name_under_code_root() {
        let prj = Project::new("a", "https://example.com/org/tool.git", Path::new("/code"));
        assert_eq!(prj.folder, PathBuf::from("/code/tool.git"));

        let prj = Project::new("b", "/srv/git/tool/", Path::new("/code"));
        assert_eq!(prj.folder, PathBuf::from("/code/tool"));

        let prj = Project::new("c", "tool", Path::new("/code"));
        assert_eq!(prj.folder, PathBuf::from("/code/tool"));
    }

    #[test]
    fn commit_state_round_trips_through_str() {
        for state in [CommitState::New, CommitState::Seen, CommitState::Dismissed] {
            assert_eq!(state.as_str().parse::<CommitState>().unwrap(), state);
        }
        assert_eq!("NEW".parse::<CommitState>().unwrap(), CommitState::New);
        assert!("archived".parse::<CommitState>().is_err());
    }

    #[test]
    fn short_hash_handles_short_input() {
        let raw = RawCommit {
            hash: "abc".into(),
            author_name: String::new(),
            committer_name: String::new(),
            commit_when: Utc.timestamp_opt(0, 0).unwrap(),
            subject: String::new(),
            message: String::new(),
        };
        let commit = Commit::from_raw(raw, "p", 0.0);
        assert_eq!(commit.short_hash(), "abc");
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn commit_serializes_with_camel_case_keys() {
        let raw = RawCommit {
            hash: "abc".into(),
            author_name: "alice".into(),
            committer_name: "bob".into(),
            commit_when: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            subject: "s".into(),
            message: "b".into(),
        };
        let json = serde_json::to_value(Commit::from_raw(raw, "p", 1.5)).unwrap();
        assert_eq!(json["authorName"], "alice");
        assert_eq!(json["state"], "new");
        assert_eq!(json["score"], 1.5);
    }

    #[test]
    fn empty_diff_has_no_changes() {
        let diff = Diff::default();
        assert!(diff.is_empty());
        assert_eq!(diff.total_changed(), 0);
    }
}
