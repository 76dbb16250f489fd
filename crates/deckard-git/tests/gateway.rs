use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use deckard_core::{DeckardError, Project};
use deckard_git::{GitGateway, RepoAction, VcsGateway};
use git2::{Repository, Signature, Time};

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn commit_file(repo: &Repository, name: &str, content: &str, when: i64, subject: &str) -> String {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let sig = Signature::new("Alice Example", "alice@example.com", &Time::new(when, 0)).unwrap();
    let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, subject, &tree, &parents)
        .unwrap()
        .to_string()
}

fn gateway() -> GitGateway {
    GitGateway::new("git", Duration::from_secs(60))
}

#[tokio::test]
async fn clone_log_and_diff_against_a_local_upstream() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let upstream_dir = tempfile::tempdir().unwrap();
    let code_dir = tempfile::tempdir().unwrap();
    let upstream = Repository::init(upstream_dir.path()).unwrap();

    let now = Utc::now().timestamp();
    let root = commit_file(&upstream, "README.md", "hello\n", now - 3_600, "initial import");
    let second = commit_file(
        &upstream,
        "foo bar.txt",
        "one\ntwo\nthree\n",
        now - 1_800,
        "add file with a space\n\nThe body spans\nseveral lines.",
    );

    let project = Project::new(
        "fixture",
        upstream_dir.path().to_string_lossy(),
        code_dir.path(),
    );
    let gw = gateway();

    assert!(!gw.is_mirrored(&project));
    assert_eq!(gw.ensure_repo(&project).await.unwrap(), RepoAction::Cloned);
    assert!(gw.is_mirrored(&project));

    let since = Utc.timestamp_opt(now - 86_400, 0).unwrap();
    let log = gw.log_since(&project.folder, since).await.unwrap();
    let hashes: Vec<_> = log.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes, [second.as_str(), root.as_str()]);
    assert_eq!(log[0].subject, "add file with a space");
    assert!(log[0].message.contains("several lines."));
    assert_eq!(log[0].author_name, "Alice Example");
    assert_eq!(log[0].commit_when.timestamp(), now - 1_800);

    // Root commit has no parent: git exits with 128, which is an empty diff.
    let root_diff = gw.diff_numstat(&project.folder, &root).await.unwrap();
    assert!(root_diff.is_empty());

    // The range runs from the commit towards its parent, so the three lines
    // the commit introduced are reported in the second column.
    let diff = gw.diff_numstat(&project.folder, &second).await.unwrap();
    assert_eq!(diff.trim_end(), "0\t3\tfoo bar.txt");
}

#[tokio::test]
async fn second_ensure_pulls_new_upstream_commits() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let upstream_dir = tempfile::tempdir().unwrap();
    let code_dir = tempfile::tempdir().unwrap();
    let upstream = Repository::init(upstream_dir.path()).unwrap();

    let now = Utc::now().timestamp();
    commit_file(&upstream, "a.txt", "a\n", now - 600, "first");

    let project = Project::new(
        "fixture",
        upstream_dir.path().to_string_lossy(),
        code_dir.path(),
    );
    let gw = gateway();
    gw.ensure_repo(&project).await.unwrap();

    let newer = commit_file(&upstream, "b.txt", "b\n", now - 60, "second");
    assert_eq!(gw.ensure_repo(&project).await.unwrap(), RepoAction::Pulled);

    let since = Utc.timestamp_opt(now - 300, 0).unwrap();
    let log = gw.log_since(&project.folder, since).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].hash, newer);
}

#[tokio::test]
async fn cloning_a_missing_remote_is_a_repo_sync_error() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let code_dir = tempfile::tempdir().unwrap();
    let missing = code_dir.path().join("does-not-exist.git");
    let project = Project::new("ghost", missing.to_string_lossy(), &code_dir.path().join("mirror"));

    let err = gateway().ensure_repo(&project).await.unwrap_err();
    match err {
        DeckardError::RepoSync { project, message } => {
            assert_eq!(project, "ghost");
            assert!(message.contains("git clone failed"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
