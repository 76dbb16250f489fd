//! The per-project sync pipeline.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use deckard_core::{Commit, DeckardConfig, DeckardError, Project, RawCommit};
use deckard_diff::numstat::parse_numstat;
use deckard_diff::score::Scorer;
use deckard_git::{RepoAction, VcsGateway};
use deckard_store::CommitStore;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::locks::ProjectLocks;
use crate::notifier::Notifier;

/// Tuning knobs of a sync pass.
///
/// # Examples
///
/// ```
/// use deckard_core::DeckardConfig;
/// use deckard_sync::SyncOptions;
///
/// let options = SyncOptions::from_config(&DeckardConfig::default());
/// assert_eq!(options.lookback.num_days(), 60);
/// assert_eq!(options.diff_concurrency, 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// How far back a project without a cursor starts.
    pub lookback: TimeDelta,
    /// Projects synced at the same time.
    pub max_parallel_projects: usize,
    /// Concurrent diff retrievals within one project.
    pub diff_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&DeckardConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &DeckardConfig) -> Self {
        Self {
            lookback: TimeDelta::days(i64::from(config.lookback_days)),
            max_parallel_projects: config.max_parallel_projects,
            diff_concurrency: config.diff_concurrency,
        }
    }
}

/// What one successful project pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    pub action: RepoAction,
    /// Commits reported by the log, boundary duplicates included.
    pub fetched: usize,
    /// Commits that were not stored before.
    pub stored: usize,
    /// Cursor persisted at the end of the pass.
    pub cursor: DateTime<Utc>,
    /// Numstat lines that could not be read and were counted as zero.
    pub degraded_lines: usize,
}

/// Result of one project within a pass.
#[derive(Debug)]
pub struct ProjectOutcome {
    pub project: String,
    pub result: Result<PassSummary, DeckardError>,
}

/// Outcomes of a pass, one per project in the order they were given.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<ProjectOutcome>,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &DeckardError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.result {
            Ok(_) => None,
            Err(e) => Some((outcome.project.as_str(), e)),
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Newly stored commits across all projects.
    pub fn stored(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .map(|summary| summary.stored)
            .sum()
    }
}

/// A scored commit plus the numstat lines that were unreadable.
struct ProcessedCommit {
    commit: Commit,
    degraded: Vec<String>,
}

/// Runs sync passes over a set of projects.
///
/// Every collaborator is injected, so the pipeline can run against a real
/// git binary and SQLite file or against in-memory fakes.
pub struct SyncOrchestrator {
    gateway: Arc<dyn VcsGateway>,
    store: Arc<dyn CommitStore>,
    scorer: Arc<dyn Scorer>,
    notifier: Arc<dyn Notifier>,
    options: SyncOptions,
    locks: ProjectLocks,
    refresh: Arc<dyn Fn() + Send + Sync>,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn VcsGateway>,
        store: Arc<dyn CommitStore>,
        scorer: Arc<dyn Scorer>,
        notifier: Arc<dyn Notifier>,
        options: SyncOptions,
    ) -> Self {
        Self {
            gateway,
            store,
            scorer,
            notifier,
            options,
            locks: ProjectLocks::new(),
            refresh: Arc::new(|| {}),
        }
    }

    /// Callback scheduled on the UI once a pass has finished.
    pub fn with_refresh(mut self, refresh: impl Fn() + Send + Sync + 'static) -> Self {
        self.refresh = Arc::new(refresh);
        self
    }

    /// Run one pass over `projects` on a background task.
    pub fn spawn_background(
        self: Arc<Self>,
        projects: Vec<Project>,
        cancel: CancellationToken,
    ) -> JoinHandle<SyncReport> {
        tokio::spawn(async move { self.run_pass(&projects, cancel).await })
    }

    /// Sync every project once.
    ///
    /// A failing project does not stop the others. When all projects are
    /// done the status line is cleared and the refresh callback is scheduled
    /// exactly once, whatever the outcomes were.
    pub async fn run_pass(&self, projects: &[Project], cancel: CancellationToken) -> SyncReport {
        let parallel = self.options.max_parallel_projects.max(1);
        let pending: Vec<_> = projects
            .iter()
            .map(|project| self.project_outcome(project, &cancel))
            .collect();
        let outcomes = stream::iter(pending)
            .buffered(parallel)
            .collect::<Vec<_>>()
            .await;

        self.notifier.clear();
        let refresh = Arc::clone(&self.refresh);
        self.notifier.schedule_on_ui(Box::new(move || refresh()));

        SyncReport { outcomes }
    }

    async fn project_outcome(&self, project: &Project, cancel: &CancellationToken) -> ProjectOutcome {
        let result = self.sync_project(project, cancel).await;
        match &result {
            Ok(summary) => tracing::info!(
                project = %project.id,
                fetched = summary.fetched,
                stored = summary.stored,
                cursor = %summary.cursor,
                "project synced"
            ),
            Err(e) if e.is_cancelled() => {
                tracing::warn!(project = %project.id, "sync cancelled");
            }
            Err(e) => {
                tracing::error!(project = %project.id, error = %e, "sync failed");
                self.notifier
                    .status(&format!("Sync failed for {}: {e}", project.id));
            }
        }
        ProjectOutcome {
            project: project.id.clone(),
            result,
        }
    }

    /// Sync a single project.
    ///
    /// Nothing is written unless every step before persistence succeeded,
    /// and the cursor only ever moves forward.
    pub async fn sync_project(
        &self,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<PassSummary, DeckardError> {
        let _guard = self.locks.acquire(&project.folder).await;

        let since = self
            .load_cursor(&project.id)
            .await?
            .unwrap_or_else(|| Utc::now() - self.options.lookback);

        if self.gateway.is_mirrored(project) {
            self.notifier
                .status(&format!("Pulling repo: {}", project.repo));
        } else {
            self.notifier.status(&format!(
                "Cloning new repo: {} (this may take a while)",
                project.repo
            ));
        }
        let action = cancellable(cancel, &project.id, self.gateway.ensure_repo(project)).await?;

        self.notifier
            .status(&format!("Updating commits for {}", project.id));
        let raw = cancellable(
            cancel,
            &project.id,
            self.gateway.log_since(&project.folder, since),
        )
        .await?;
        let fetched = raw.len();

        let processed = cancellable(cancel, &project.id, self.process_commits(project, raw)).await?;

        let mut cursor = since;
        let mut degraded_lines = 0;
        let mut commits = Vec::with_capacity(processed.len());
        for ProcessedCommit { commit, degraded } in processed {
            if !degraded.is_empty() {
                self.report_degraded(&commit, &degraded);
                degraded_lines += degraded.len();
            }
            cursor = cursor.max(commit.commit_when);
            commits.push(commit);
        }

        if cancel.is_cancelled() {
            return Err(DeckardError::Cancelled(project.id.clone()));
        }
        let stored = self.persist(&project.id, commits, cursor).await?;

        Ok(PassSummary {
            action,
            fetched,
            stored,
            cursor,
            degraded_lines,
        })
    }

    async fn load_cursor(&self, project: &str) -> Result<Option<DateTime<Utc>>, DeckardError> {
        let store = Arc::clone(&self.store);
        let project = project.to_string();
        tokio::task::spawn_blocking(move || store.get_fetch_state(&project))
            .await
            .map_err(|e| DeckardError::Persistence(format!("cursor lookup task failed: {e}")))?
    }

    async fn persist(
        &self,
        project: &str,
        commits: Vec<Commit>,
        cursor: DateTime<Utc>,
    ) -> Result<usize, DeckardError> {
        let store = Arc::clone(&self.store);
        let project = project.to_string();
        tokio::task::spawn_blocking(move || store.persist_pass(&project, &commits, cursor))
            .await
            .map_err(|e| DeckardError::Persistence(format!("persist task failed: {e}")))?
    }

    /// Diff and score commits, keeping log order.
    ///
    /// Up to `diff_concurrency` diffs are in flight at once. The first
    /// failing commit aborts the project.
    async fn process_commits(
        &self,
        project: &Project,
        raw: Vec<RawCommit>,
    ) -> Result<Vec<ProcessedCommit>, DeckardError> {
        let concurrency = self.options.diff_concurrency.max(1);
        let pending: Vec<_> = raw
            .into_iter()
            .map(|commit| self.process_commit(&project.id, &project.folder, commit))
            .collect();
        stream::iter(pending)
            .buffered(concurrency)
            .try_collect()
            .await
    }

    async fn process_commit(
        &self,
        project: &str,
        folder: &Path,
        raw: RawCommit,
    ) -> Result<ProcessedCommit, DeckardError> {
        let numstat = self.gateway.diff_numstat(folder, &raw.hash).await?;
        let parsed = parse_numstat(&numstat)?;
        let score = self.scorer.score(&parsed.diff).map_err(|e| {
            DeckardError::Scoring(format!("commit {} of '{project}': {e}", raw.hash))
        })?;

        Ok(ProcessedCommit {
            commit: Commit::from_raw(raw, project, score),
            degraded: parsed.degraded,
        })
    }

    fn report_degraded(&self, commit: &Commit, lines: &[String]) {
        for line in lines {
            tracing::warn!(
                project = %commit.project,
                hash = %commit.hash,
                line = %line,
                "unreadable numstat line counted as zero"
            );
        }
        self.notifier.status(&format!(
            "{}: {} unreadable diff line(s) in {} counted as zero",
            commit.project,
            lines.len(),
            commit.short_hash()
        ));
    }
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    project: &str,
    fut: impl Future<Output = Result<T, DeckardError>>,
) -> Result<T, DeckardError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeckardError::Cancelled(project.to_string())),
        result = fut => result,
    }
}
