use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DeckardError;
use crate::types::Project;

/// Top-level configuration loaded from `deckard.toml`.
///
/// # Examples
///
/// ```
/// use deckard_core::DeckardConfig;
///
/// let config = DeckardConfig::default();
/// assert_eq!(config.lookback_days, 60);
/// assert!(config.projects.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckardConfig {
    /// Root folder that holds the working copy of every project.
    #[serde(default = "default_code_folder")]
    pub code_folder: PathBuf,
    /// SQLite database holding commits and fetch cursors.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// How far back the first sync of a project reaches (default: 60).
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Git executable to invoke (default: `"git"`).
    #[serde(default = "default_git")]
    pub git: String,
    /// Upper bound for a single git invocation, in seconds (default: 300).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Projects synced at the same time (default: 1).
    #[serde(default = "default_max_parallel_projects")]
    pub max_parallel_projects: usize,
    /// Concurrent `git diff` calls per repository (default: 4).
    #[serde(default = "default_diff_concurrency")]
    pub diff_concurrency: usize,
    /// Weights of the change-magnitude score.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Configured projects, keyed by project id.
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

fn default_code_folder() -> PathBuf {
    PathBuf::from("~/.deckard/code")
}

fn default_database() -> PathBuf {
    PathBuf::from("~/.deckard/deckard.db")
}

fn default_lookback_days() -> u32 {
    60
}

fn default_git() -> String {
    "git".into()
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_max_parallel_projects() -> usize {
    1
}

fn default_diff_concurrency() -> usize {
    4
}

impl Default for DeckardConfig {
    fn default() -> Self {
        Self {
            code_folder: default_code_folder(),
            database: default_database(),
            lookback_days: default_lookback_days(),
            git: default_git(),
            command_timeout_secs: default_command_timeout_secs(),
            max_parallel_projects: default_max_parallel_projects(),
            diff_concurrency: default_diff_concurrency(),
            scoring: ScoringConfig::default(),
            projects: BTreeMap::new(),
        }
    }
}

impl DeckardConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeckardError::Io`] if the file cannot be read,
    /// [`DeckardError::Toml`] if the content is not valid TOML, or
    /// [`DeckardError::Config`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, DeckardError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Examples
    ///
    /// ```
    /// use deckard_core::DeckardConfig;
    ///
    /// let toml = r#"
    /// code_folder = "/code"
    ///
    /// [projects.deckard]
    /// repo = "https://github.com/Ragnaroek/deckard.git"
    /// "#;
    /// let config = DeckardConfig::from_toml(toml).unwrap();
    /// let projects = config.projects();
    /// assert_eq!(projects[0].id, "deckard");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, DeckardError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sync pipeline cannot work with.
    pub fn validate(&self) -> Result<(), DeckardError> {
        if self.code_folder.as_os_str().is_empty() {
            return Err(DeckardError::Config("code_folder must not be empty".into()));
        }
        if self.git.trim().is_empty() {
            return Err(DeckardError::Config("git executable must not be empty".into()));
        }
        if self.max_parallel_projects == 0 {
            return Err(DeckardError::Config(
                "max_parallel_projects must be at least 1".into(),
            ));
        }
        if self.diff_concurrency == 0 {
            return Err(DeckardError::Config(
                "diff_concurrency must be at least 1".into(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(DeckardError::Config(
                "command_timeout_secs must be at least 1".into(),
            ));
        }
        // Working copies are named after the repo base name, so two
        // projects sharing one would share a folder.
        let mut folders: BTreeMap<&str, &str> = BTreeMap::new();
        for (id, project) in &self.projects {
            let base = crate::types::repo_base_name(&project.repo);
            if base.is_empty() || base == "." || base == ".." {
                return Err(DeckardError::Config(format!(
                    "project '{id}' has no usable repo locator: '{}'",
                    project.repo
                )));
            }
            if let Some(other) = folders.insert(base, id) {
                return Err(DeckardError::Config(format!(
                    "projects '{other}' and '{id}' would both be mirrored into folder '{base}'"
                )));
            }
        }
        Ok(())
    }

    /// Code root with a leading `~/` expanded to the home directory.
    pub fn code_root(&self) -> PathBuf {
        expand_home(&self.code_folder)
    }

    /// Database path with a leading `~/` expanded to the home directory.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.database)
    }

    /// All configured projects, ordered by id.
    pub fn projects(&self) -> Vec<Project> {
        let root = self.code_root();
        self.projects
            .iter()
            .map(|(id, p)| Project::new(id.clone(), p.repo.clone(), &root))
            .collect()
    }
}

/// One `[projects.<id>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Remote locator (URL or path) to clone from.
    pub repo: String,
}

/// Weights of the default change-magnitude scorer.
///
/// # Examples
///
/// ```
/// use deckard_core::ScoringConfig;
///
/// let config = ScoringConfig::default();
/// assert_eq!(config.added_weight, 1.0);
/// assert!(!config.normalize_by_files);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_weight")]
    pub added_weight: f64,
    #[serde(default = "default_weight")]
    pub deleted_weight: f64,
    /// Divide the weighted sum by the number of touched files.
    #[serde(default)]
    pub normalize_by_files: bool,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            added_weight: default_weight(),
            deleted_weight: default_weight(),
            normalize_by_files: false,
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
