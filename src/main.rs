mod ui;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use deckard_core::{Commit, CommitState, DeckardConfig, OutputFormat};
use deckard_diff::score::ChurnScorer;
use deckard_git::GitGateway;
use deckard_store::{CommitFilter, ProjectStats, SqliteStore};
use deckard_sync::{SyncOptions, SyncOrchestrator, SyncReport};

use crate::ui::ConsoleUi;

const CONFIG_FILE: &str = "deckard.toml";

#[derive(Parser)]
#[command(
    name = "deckard",
    version,
    about = "Mirror git repositories and score every new commit",
    long_about = "Deckard keeps a local mirror of every configured repository, reads the\n\
                   commits that arrived since the last sync, and scores each one by the size\n\
                   of its change so the big ones stand out.\n\n\
                   Examples:\n  \
                     deckard init                     Create a deckard.toml config file\n  \
                     deckard sync                     Pull all projects and ingest new commits\n  \
                     deckard list --project deckard   Show new commits of one project\n  \
                     deckard mark deckard 1a2b3c seen Mark a commit as seen\n  \
                     deckard status                   Show sync cursors and counts"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: deckard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text  Human-readable listings (default)\n  \
                         json  Machine-readable JSON with camelCase keys"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Pull every project and ingest its new commits
    #[command(long_about = "Pull every project and ingest its new commits.\n\n\
        Prints the commits already known, then clones or pulls each configured project,\n\
        reads the commits since its last sync, scores their diffs and stores them.\n\
        Press Ctrl-C to cancel; a cancelled project keeps its previous state.\n\n\
        Exits with a non-zero status if any project failed.")]
    Sync,
    /// List stored commits
    #[command(long_about = "List stored commits, newest sync first.\n\n\
        Examples:\n  deckard list\n  deckard list --project deckard --state all\n  deckard list --limit 10 --format json")]
    List {
        /// Only commits of this project
        #[arg(long)]
        project: Option<String>,

        /// Lifecycle state to show (default: new)
        #[arg(long, default_value = "new")]
        state: StateFilter,

        /// Maximum commits to show
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Change the lifecycle state of a commit
    Mark {
        /// Project id the commit belongs to
        project: String,

        /// Full commit hash
        hash: String,

        /// New state: new, seen or dismissed
        state: CommitState,
    },
    /// Show the sync cursor and commit counts of every project
    Status,
    /// Create a default deckard.toml configuration file
    #[command(long_about = "Create a default deckard.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if deckard.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StateFilter {
    /// Commits not looked at yet
    New,
    /// Commits marked as seen
    Seen,
    /// Commits marked as dismissed
    Dismissed,
    /// Every stored commit
    All,
}

impl StateFilter {
    fn state(self) -> Option<CommitState> {
        match self {
            StateFilter::New => Some(CommitState::New),
            StateFilter::Seen => Some(CommitState::Seen),
            StateFilter::Dismissed => Some(CommitState::Dismissed),
            StateFilter::All => None,
        }
    }
}

/// JSON view of one project's sync result.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeView {
    project: String,
    success: bool,
    fetched: usize,
    stored: usize,
    cursor: Option<DateTime<Utc>>,
    degraded_lines: usize,
    error: Option<String>,
}

/// JSON view of a configured project in `deckard status`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    project: String,
    repo: String,
    folder: PathBuf,
    last_commit_when: Option<DateTime<Utc>>,
    total_commits: usize,
    new_commits: usize,
}

const DEFAULT_CONFIG: &str = r#"# Deckard Configuration

# Folder holding the local mirror of every project
# code_folder = "~/.deckard/code"

# SQLite database with stored commits and sync cursors
# database = "~/.deckard/deckard.db"

# How many days the first sync of a project reaches back
# lookback_days = 60

# git executable and the time limit of a single git call
# git = "git"
# command_timeout_secs = 300

# Projects synced at once, and concurrent diffs per project
# max_parallel_projects = 1
# diff_concurrency = 4

[scoring]
# added_weight = 1.0
# deleted_weight = 1.0
# normalize_by_files = false

# One table per project; the mirror folder is named after the last
# segment of the repo locator.
# [projects.deckard]
# repo = "https://github.com/Ragnaroek/deckard.git"
"#;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<DeckardConfig> {
    let config = match path {
        Some(path) => DeckardConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                DeckardConfig::from_file(default_path)?
            } else {
                DeckardConfig::default()
            }
        }
    };
    Ok(config)
}

fn open_store(config: &DeckardConfig) -> Result<Arc<SqliteStore>> {
    let path = config.database_path();
    tracing::debug!(database = %path.display(), "opening commit store");
    Ok(Arc::new(SqliteStore::open(&path)?))
}

fn print_commits(commits: &[Commit]) {
    if commits.is_empty() {
        println!("No commits.");
        return;
    }
    for commit in commits {
        println!(
            "{}  {:>8.1}  {}  {:<16} {} ({})",
            commit.short_hash(),
            commit.score,
            commit.commit_when.format("%Y-%m-%d %H:%M"),
            commit.project,
            commit.subject,
            commit.author_name,
        );
    }
}

fn print_report(report: &SyncReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => {
                print!(
                    "{}: {} new of {} fetched, cursor {}",
                    outcome.project,
                    summary.stored,
                    summary.fetched,
                    summary.cursor.format("%Y-%m-%d %H:%M:%S")
                );
                if summary.degraded_lines > 0 {
                    print!(", {} unreadable diff line(s)", summary.degraded_lines);
                }
                println!();
            }
            Err(e) => println!("{}: failed: {e}", outcome.project),
        }
    }
}

fn report_views(report: &SyncReport) -> Vec<OutcomeView> {
    report
        .outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(summary) => OutcomeView {
                project: outcome.project.clone(),
                success: true,
                fetched: summary.fetched,
                stored: summary.stored,
                cursor: Some(summary.cursor),
                degraded_lines: summary.degraded_lines,
                error: None,
            },
            Err(e) => OutcomeView {
                project: outcome.project.clone(),
                success: false,
                fetched: 0,
                stored: 0,
                cursor: None,
                degraded_lines: 0,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

fn new_commits() -> CommitFilter {
    CommitFilter {
        state: Some(CommitState::New),
        ..CommitFilter::default()
    }
}

async fn run_sync(config: &DeckardConfig, format: OutputFormat) -> Result<()> {
    let projects = config.projects();
    if projects.is_empty() {
        miette::bail!(miette::miette!(
            help = "Add a [projects.<id>] table with a repo locator to {CONFIG_FILE}",
            "No projects configured"
        ));
    }

    // Cached state first, so there is something to look at while syncing.
    let store = open_store(config)?;
    if format == OutputFormat::Text {
        print_commits(&store.list_commits(&new_commits())?);
    }

    let (console, handle) = ConsoleUi::new(std::io::stderr().is_terminal());
    let ui_task = tokio::spawn(console.run());

    let gateway = GitGateway::new(
        config.git.clone(),
        Duration::from_secs(config.command_timeout_secs),
    );
    let refresh_store = Arc::clone(&store);
    let orchestrator = SyncOrchestrator::new(
        Arc::new(gateway),
        store.clone(),
        Arc::new(ChurnScorer::from_config(&config.scoring)),
        Arc::new(handle),
        SyncOptions::from_config(config),
    )
    .with_refresh(move || {
        if format != OutputFormat::Text {
            return;
        }
        match refresh_store.list_commits(&new_commits()) {
            Ok(commits) => {
                println!();
                print_commits(&commits);
            }
            Err(e) => tracing::error!(error = %e, "failed to reload commits"),
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling sync");
            on_interrupt.cancel();
        }
    });

    let report = Arc::new(orchestrator)
        .spawn_background(projects, cancel)
        .await
        .into_diagnostic()?;
    // The orchestrator owned the last UI handle, so the loop drains and ends.
    ui_task.await.into_diagnostic()?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "commits": store.list_commits(&new_commits())?,
                "projects": report_views(&report),
            });
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }
        OutputFormat::Text => {
            println!();
            print_report(&report);
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        miette::bail!("{failed} project(s) failed to sync");
    }
    Ok(())
}

fn run_status(config: &DeckardConfig, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.project_stats()?;
    let stats_of = |id: &str| stats.iter().find(|s| s.project == id);

    let views: Vec<StatusView> = config
        .projects()
        .into_iter()
        .map(|project| {
            let stats = stats_of(&project.id);
            StatusView {
                last_commit_when: stats.and_then(|s| s.last_commit_when),
                total_commits: stats.map_or(0, |s| s.total_commits),
                new_commits: stats.map_or(0, |s| s.new_commits),
                project: project.id,
                repo: project.repo,
                folder: project.folder,
            }
        })
        .collect();

    // Projects removed from the config still have rows in the database.
    let orphaned: Vec<&ProjectStats> = stats
        .iter()
        .filter(|s| !config.projects.contains_key(&s.project))
        .collect();

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "projects": views,
                "unconfigured": orphaned,
            });
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }
        OutputFormat::Text => {
            if views.is_empty() {
                println!("No projects configured.");
            }
            for view in &views {
                let cursor = view.last_commit_when.map_or_else(
                    || "never synced".to_string(),
                    |c| format!("synced up to {}", c.format("%Y-%m-%d %H:%M:%S")),
                );
                println!(
                    "{}: {cursor}, {} commits ({} new)\n  {} -> {}",
                    view.project,
                    view.total_commits,
                    view.new_commits,
                    view.repo,
                    view.folder.display()
                );
            }
            for stats in orphaned {
                println!(
                    "{} (not configured): {} commits ({} new)",
                    stats.project, stats.total_commits, stats.new_commits
                );
            }
        }
    }
    Ok(())
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("deckard v{version} - mirror git repositories and score every new commit\n");

    println!("Quick start:");
    println!("  deckard init      Create a deckard.toml config file");
    println!("  deckard sync      Pull all projects and ingest new commits\n");

    println!("All commands:");
    println!("  sync      Clone or pull every project and store its new commits");
    println!("  list      Show stored commits");
    println!("  mark      Mark a commit as new, seen or dismissed");
    println!("  status    Show sync cursors and commit counts");
    println!("  init      Create default configuration\n");

    println!("Run 'deckard <command> --help' for details.");
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        None => {
            print_welcome();
        }
        Some(Command::Sync) => {
            let config = load_config(cli.config.as_deref())?;
            run_sync(&config, cli.format).await?;
        }
        Some(Command::List {
            ref project,
            state,
            limit,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            let commits = store.list_commits(&CommitFilter {
                project: project.clone(),
                state: state.state(),
                limit,
            })?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&commits).into_diagnostic()?);
                }
                OutputFormat::Text => print_commits(&commits),
            }
        }
        Some(Command::Mark {
            ref project,
            ref hash,
            state,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            if !store.set_state(project, hash, state)? {
                miette::bail!(miette::miette!(
                    help = "Use `deckard list --state all` to see stored hashes",
                    "No commit {hash} stored for project '{project}'"
                ));
            }
            if cli.format == OutputFormat::Text {
                println!("Marked {hash} as {state}");
            }
        }
        Some(Command::Status) => {
            let config = load_config(cli.config.as_deref())?;
            run_status(&config, cli.format)?;
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "deckard", &mut std::io::stdout());
        }
    }

    Ok(())
}
