//! SQLite storage for commits and fetch cursors.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use deckard_core::{Commit, CommitState, DeckardError};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// What the sync pipeline needs from persistence.
///
/// `store_commits` must ignore commits already stored for the same project
/// and hash, so a pass that re-fetches boundary commits (or re-runs after a
/// crash between the two writes) never duplicates them.
pub trait CommitStore: Send + Sync {
    /// Last ingested commit time of `project`, if it was ever synced.
    fn get_fetch_state(&self, project: &str) -> Result<Option<DateTime<Utc>>, DeckardError>;

    /// Move the cursor of `project` to `when`. Never moves it backwards.
    fn update_fetch_state(&self, project: &str, when: DateTime<Utc>)
        -> Result<(), DeckardError>;

    /// Store `commits` in the given order; returns how many were new.
    fn store_commits(&self, commits: &[Commit]) -> Result<usize, DeckardError>;

    /// Store one pass worth of commits for `project` and advance its cursor.
    ///
    /// Implementations should make both writes one unit. The default runs
    /// them back to back, commits first, which is still recoverable because
    /// a lagging cursor only causes deduplicated re-ingestion.
    fn persist_pass(
        &self,
        project: &str,
        commits: &[Commit],
        cursor: DateTime<Utc>,
    ) -> Result<usize, DeckardError> {
        let stored = self.store_commits(commits)?;
        self.update_fetch_state(project, cursor)?;
        Ok(stored)
    }
}

/// Selection of stored commits for [`SqliteStore::list_commits`].
///
/// # Examples
///
/// ```
/// use deckard_core::CommitState;
/// use deckard_store::CommitFilter;
///
/// let filter = CommitFilter {
///     state: Some(CommitState::New),
///     limit: Some(20),
///     ..CommitFilter::default()
/// };
/// assert!(filter.project.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommitFilter {
    pub project: Option<String>,
    pub state: Option<CommitState>,
    pub limit: Option<usize>,
}

/// Cursor and commit counts of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub project: String,
    pub last_commit_when: Option<DateTime<Utc>>,
    pub total_commits: usize,
    pub new_commits: usize,
}

/// [`CommitStore`] on an embedded SQLite database.
///
/// Commits are keyed by `(project, hash)`. Each [`CommitStore::store_commits`]
/// call is one batch; listings return the newest batch first and keep the
/// order commits had inside their batch.
///
/// # Examples
///
/// ```
/// use deckard_store::{CommitStore, SqliteStore};
///
/// let store = SqliteStore::in_memory().unwrap();
/// assert!(store.get_fetch_state("deckard").unwrap().is_none());
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`DeckardError::Persistence`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DeckardError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DeckardError::Persistence(format!("failed to create database directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DeckardError::Persistence(format!("failed to open database: {e}")))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, DeckardError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DeckardError::Persistence(format!("failed to create in-memory database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DeckardError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DeckardError> {
        self.conn
            .lock()
            .map_err(|_| DeckardError::Persistence("database lock poisoned".into()))
    }

    /// Stored commits matching `filter`.
    ///
    /// # Examples
    ///
    /// ```
    /// use deckard_store::{CommitFilter, SqliteStore};
    ///
    /// let store = SqliteStore::in_memory().unwrap();
    /// assert!(store.list_commits(&CommitFilter::default()).unwrap().is_empty());
    /// ```
    pub fn list_commits(&self, filter: &CommitFilter) -> Result<Vec<Commit>, DeckardError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT hash, author_name, committer_name, commit_when, subject, message,
                        project, state, score
                 FROM commits
                 WHERE (?1 IS NULL OR project = ?1) AND (?2 IS NULL OR state = ?2)
                 ORDER BY batch DESC, position ASC
                 LIMIT ?3",
            )
            .map_err(|e| DeckardError::Persistence(format!("failed to prepare query: {e}")))?;

        let limit = filter.limit.map_or(-1, |l| l as i64);
        let rows = stmt
            .query_map(
                params![
                    filter.project,
                    filter.state.map(|s| s.as_str()),
                    limit
                ],
                commit_from_row,
            )
            .map_err(|e| DeckardError::Persistence(format!("failed to list commits: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| DeckardError::Persistence(format!("failed to read commit: {e}")))
    }

    /// Move a stored commit to `state`. Returns `false` if it is unknown.
    pub fn set_state(
        &self,
        project: &str,
        hash: &str,
        state: CommitState,
    ) -> Result<bool, DeckardError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE commits SET state = ?3 WHERE project = ?1 AND hash = ?2",
                params![project, hash, state.as_str()],
            )
            .map_err(|e| DeckardError::Persistence(format!("failed to update state: {e}")))?;
        Ok(changed > 0)
    }

    /// Cursor and counts for every project that has a cursor.
    pub fn project_stats(&self) -> Result<Vec<ProjectStats>, DeckardError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT f.project, f.last_commit_when, COUNT(c.hash),
                        COALESCE(SUM(CASE WHEN c.state = 'new' THEN 1 ELSE 0 END), 0)
                 FROM fetch_state f
                 LEFT JOIN commits c ON c.project = f.project
                 GROUP BY f.project
                 ORDER BY f.project",
            )
            .map_err(|e| DeckardError::Persistence(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let total: i64 = row.get(2)?;
                let new: i64 = row.get(3)?;
                Ok(ProjectStats {
                    project: row.get(0)?,
                    last_commit_when: Some(timestamp_from_column(row, 1)?),
                    total_commits: total as usize,
                    new_commits: new as usize,
                })
            })
            .map_err(|e| DeckardError::Persistence(format!("failed to read stats: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| DeckardError::Persistence(format!("failed to read stats: {e}")))
    }
}

impl CommitStore for SqliteStore {
    fn get_fetch_state(&self, project: &str) -> Result<Option<DateTime<Utc>>, DeckardError> {
        self.conn()?
            .query_row(
                "SELECT last_commit_when FROM fetch_state WHERE project = ?1",
                params![project],
                |row| timestamp_from_column(row, 0),
            )
            .optional()
            .map_err(|e| {
                DeckardError::Persistence(format!("failed to read fetch state of '{project}': {e}"))
            })
    }

    fn update_fetch_state(
        &self,
        project: &str,
        when: DateTime<Utc>,
    ) -> Result<(), DeckardError> {
        let conn = self.conn()?;
        upsert_cursor(&conn, project, when)
    }

    fn store_commits(&self, commits: &[Commit]) -> Result<usize, DeckardError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| DeckardError::Persistence(format!("failed to begin transaction: {e}")))?;
        let stored = insert_batch(&tx, commits)?;
        tx.commit()
            .map_err(|e| DeckardError::Persistence(format!("failed to commit: {e}")))?;
        Ok(stored)
    }

    fn persist_pass(
        &self,
        project: &str,
        commits: &[Commit],
        cursor: DateTime<Utc>,
    ) -> Result<usize, DeckardError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| DeckardError::Persistence(format!("failed to begin transaction: {e}")))?;
        let stored = insert_batch(&tx, commits)?;
        upsert_cursor(&tx, project, cursor)?;
        tx.commit()
            .map_err(|e| DeckardError::Persistence(format!("failed to commit: {e}")))?;

        tracing::debug!(project, stored, cursor = %cursor, "persisted sync pass");
        Ok(stored)
    }
}

fn init_schema(conn: &Connection) -> Result<(), DeckardError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS commits (
            project TEXT NOT NULL,
            hash TEXT NOT NULL,
            author_name TEXT NOT NULL,
            committer_name TEXT NOT NULL,
            commit_when INTEGER NOT NULL,
            subject TEXT NOT NULL,
            message TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'new',
            score REAL NOT NULL,
            batch INTEGER NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (project, hash)
        );

        CREATE INDEX IF NOT EXISTS commits_by_state ON commits(state);
        CREATE INDEX IF NOT EXISTS commits_by_batch ON commits(batch, position);

        CREATE TABLE IF NOT EXISTS fetch_state (
            project TEXT PRIMARY KEY,
            last_commit_when INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| DeckardError::Persistence(format!("failed to create schema: {e}")))
}

/// Insert `commits` as a new batch, skipping ones already stored.
fn insert_batch(conn: &Connection, commits: &[Commit]) -> Result<usize, DeckardError> {
    if commits.is_empty() {
        return Ok(0);
    }

    let batch: i64 = conn
        .query_row("SELECT COALESCE(MAX(batch), 0) + 1 FROM commits", [], |row| {
            row.get(0)
        })
        .map_err(|e| DeckardError::Persistence(format!("failed to allocate batch: {e}")))?;

    let mut stmt = conn
        .prepare(
            "INSERT OR IGNORE INTO commits
             (project, hash, author_name, committer_name, commit_when, subject, message,
              state, score, batch, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .map_err(|e| DeckardError::Persistence(format!("failed to prepare insert: {e}")))?;

    let mut stored = 0;
    for (position, commit) in commits.iter().enumerate() {
        stored += stmt
            .execute(params![
                commit.project,
                commit.hash,
                commit.author_name,
                commit.committer_name,
                commit.commit_when.timestamp(),
                commit.subject,
                commit.message,
                commit.state.as_str(),
                commit.score,
                batch,
                position as i64,
            ])
            .map_err(|e| {
                DeckardError::Persistence(format!("failed to store commit {}: {e}", commit.hash))
            })?;
    }
    Ok(stored)
}

fn upsert_cursor(conn: &Connection, project: &str, when: DateTime<Utc>) -> Result<(), DeckardError> {
    conn.execute(
        "INSERT INTO fetch_state (project, last_commit_when) VALUES (?1, ?2)
         ON CONFLICT(project) DO UPDATE
         SET last_commit_when = MAX(last_commit_when, excluded.last_commit_when)",
        params![project, when.timestamp()],
    )
    .map_err(|e| {
        DeckardError::Persistence(format!("failed to update fetch state of '{project}': {e}"))
    })?;
    Ok(())
}

fn timestamp_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<Commit> {
    let state: String = row.get(7)?;
    let state = state
        .parse::<CommitState>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, e.into()))?;

    Ok(Commit {
        hash: row.get(0)?,
        author_name: row.get(1)?,
        committer_name: row.get(2)?,
        commit_when: timestamp_from_column(row, 3)?,
        subject: row.get(4)?,
        message: row.get(5)?,
        project: row.get(6)?,
        state,
        score: row.get(8)?,
    })
}
