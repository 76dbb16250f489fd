//! Version-control gateway backed by the `git` command line tool.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deckard_core::{DeckardError, Project, RawCommit};
use tokio::process::Command;

use crate::log::{parse_log, LOG_FORMAT};

/// Exit code git uses when `<hash>^` does not exist (the root commit).
const NO_PARENT_EXIT_CODE: i32 = 128;

/// What [`VcsGateway::ensure_repo`] did to bring the mirror up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoAction {
    /// The working copy did not exist and was cloned.
    Cloned,
    /// The existing working copy was pulled.
    Pulled,
}

/// Primitives the sync pipeline needs from a version-control tool.
#[async_trait]
pub trait VcsGateway: Send + Sync {
    /// Whether the project's working copy already exists locally.
    fn is_mirrored(&self, project: &Project) -> bool {
        project.folder.exists()
    }

    /// Clone the project if its folder is missing, pull it otherwise.
    async fn ensure_repo(&self, project: &Project) -> Result<RepoAction, DeckardError>;

    /// Commits after `since`, in the order the tool reports them.
    async fn log_since(
        &self,
        folder: &Path,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawCommit>, DeckardError>;

    /// Raw numstat text of `hash` against its first parent.
    ///
    /// A root commit yields an empty string.
    async fn diff_numstat(&self, folder: &Path, hash: &str) -> Result<String, DeckardError>;
}

/// [`VcsGateway`] that shells out to `git`.
///
/// Every invocation runs with stdin closed, terminal prompts disabled, and
/// is killed once `timeout` elapses.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use deckard_git::GitGateway;
///
/// let gateway = GitGateway::new("git", Duration::from_secs(60));
/// assert_eq!(gateway.timeout(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct GitGateway {
    git: String,
    timeout: Duration,
}

impl Default for GitGateway {
    fn default() -> Self {
        Self::new("git", Duration::from_secs(300))
    }
}

impl GitGateway {
    pub fn new(git: impl Into<String>, timeout: Duration) -> Self {
        Self {
            git: git.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command<I, S>(&self, args: I, cwd: Option<&Path>) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run `cmd` to completion, whatever its exit status.
    ///
    /// Only spawn failures and timeouts are errors here; callers decide what
    /// a non-zero exit means.
    async fn run(&self, mut cmd: Command, what: &str) -> Result<Output, String> {
        tracing::debug!(command = what, "running git");
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("failed to run {what}: {e}")),
            Err(_) => Err(format!(
                "{what} timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }

    async fn clone_repo(&self, project: &Project) -> Result<(), String> {
        if let Some(parent) = project.folder.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }
        let mut cmd = self.command(["clone"], None);
        cmd.arg(&project.repo).arg(&project.folder);
        let output = self.run(cmd, "git clone").await?;
        check_success(&output, "git clone")
    }

    async fn pull_repo(&self, folder: &Path) -> Result<(), String> {
        let output = self
            .run(self.command(["pull"], Some(folder)), "git pull")
            .await?;
        check_success(&output, "git pull")
    }
}

#[async_trait]
impl VcsGateway for GitGateway {
    async fn ensure_repo(&self, project: &Project) -> Result<RepoAction, DeckardError> {
        let (action, result) = if self.is_mirrored(project) {
            (RepoAction::Pulled, self.pull_repo(&project.folder).await)
        } else {
            (RepoAction::Cloned, self.clone_repo(project).await)
        };

        result.map_err(|message| DeckardError::RepoSync {
            project: project.id.clone(),
            message,
        })?;
        Ok(action)
    }

    async fn log_since(
        &self,
        folder: &Path,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawCommit>, DeckardError> {
        let since_arg = format!(
            "--since={}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let format_arg = format!("--format={LOG_FORMAT}");
        let cmd = self.command(["log", since_arg.as_str(), format_arg.as_str()], Some(folder));

        let log_err = |message: String| DeckardError::LogRetrieval {
            folder: folder.to_path_buf(),
            message,
        };
        let output = self.run(cmd, "git log").await.map_err(log_err)?;
        check_success(&output, "git log").map_err(log_err)?;

        parse_log(&String::from_utf8_lossy(&output.stdout), folder)
    }

    async fn diff_numstat(&self, folder: &Path, hash: &str) -> Result<String, DeckardError> {
        let range = format!("{hash}..{hash}^");
        let cmd = self.command(["diff", "--numstat", range.as_str(), "--"], Some(folder));

        let diff_err = |message: String| DeckardError::DiffRetrieval {
            hash: hash.to_string(),
            message,
        };
        let output = self.run(cmd, "git diff").await.map_err(diff_err)?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        if output.status.code() == Some(NO_PARENT_EXIT_CODE) {
            // probably the first commit of the repository
            tracing::debug!(hash, "no parent to diff against, treating as empty diff");
            return Ok(String::new());
        }
        Err(diff_err(failure_message(&output, "git diff")))
    }
}

fn check_success(output: &Output, what: &str) -> Result<(), String> {
    if output.status.success() {
        Ok(())
    } else {
        Err(failure_message(output, what))
    }
}

fn failure_message(output: &Output, what: &str) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{what} failed ({}): {}", output.status, stderr.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_gateway_uses_git_on_path() {
        let gateway = GitGateway::default();
        assert_eq!(gateway.git, "git");
        assert_eq!(gateway.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn is_mirrored_checks_the_project_folder() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = GitGateway::default();

        let present = Project {
            id: "present".into(),
            repo: "unused".into(),
            folder: dir.path().to_path_buf(),
        };
        let missing = Project {
            id: "missing".into(),
            repo: "unused".into(),
            folder: PathBuf::from(dir.path()).join("nope"),
        };
        assert!(gateway.is_mirrored(&present));
        assert!(!gateway.is_mirrored(&missing));
    }

    #[tokio::test]
    async fn missing_binary_is_a_log_retrieval_error() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = GitGateway::new("/nonexistent/deckard-git-binary", Duration::from_secs(5));

        let err = gateway
            .log_since(dir.path(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DeckardError::LogRetrieval { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_a_repo_sync_error() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = GitGateway::new("/nonexistent/deckard-git-binary", Duration::from_secs(5));
        let project = Project::new("p", "/srv/git/p.git", dir.path());

        let err = gateway.ensure_repo(&project).await.unwrap_err();
        match err {
            DeckardError::RepoSync { project, .. } => assert_eq!(project, "p"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
