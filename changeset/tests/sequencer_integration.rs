//! Batch execution against a real temporary workspace, `sh`, and the
//! filesystem store.
#![cfg(unix)]

use std::fs;

use changeset::executor::ShellExecutor;
use changeset::persistence::FsPersistence;
use changeset::{
    Action, ActionBatch, ActionSequencer, ActionStatus, FailureKind, FilePath, Session, WorkspaceRoot,
    WorkspaceSnapshot,
};
use tempfile::TempDir;

fn workspace() -> (TempDir, WorkspaceRoot) {
    let dir = tempfile::tempdir().unwrap();
    let root = WorkspaceRoot::open(dir.path()).unwrap();
    (dir, root)
}

fn session(root: &WorkspaceRoot) -> Session {
    Session::new(
        root.clone(),
        FsPersistence::new(root.clone()),
        ShellExecutor::new(root.path()),
    )
}

#[test]
fn command_sees_file_written_before_it() {
    let (_dir, root) = workspace();
    let mut session = session(&root);
    let batch = ActionBatch::new(
        "ordering",
        "write then read",
        vec![Action::file("A", "x"), Action::command("cat A")],
    );

    let result = session.execute(batch);

    assert!(result.is_success());
    let output = result.reports[1].output.as_ref().unwrap();
    assert_eq!(output.stdout, "x");
    assert_eq!(
        session.snapshot().get(&FilePath::parse("A").unwrap()).unwrap().as_str(),
        "x"
    );
}

#[test]
fn invalid_path_fails_and_skips_the_rest() {
    let (dir, root) = workspace();
    let mut session = session(&root);
    let batch = ActionBatch::new(
        "halt",
        "bad path first",
        vec![
            Action::file("../outside.txt", "nope"),
            Action::file("B", "y"),
            Action::command("touch ran"),
        ],
    );

    let result = session.execute(batch);

    assert_eq!(result.reports[0].status.failure_kind(), Some(FailureKind::InvalidPath));
    assert_eq!(result.reports[1].status, ActionStatus::Skipped);
    assert_eq!(result.reports[2].status, ActionStatus::Skipped);
    assert!(!dir.path().join("B").exists());
    assert!(!dir.path().join("ran").exists());
}

#[test]
fn false_alone_fails_without_raising() {
    let (_dir, root) = workspace();
    let mut session = session(&root);
    let result = session.execute(ActionBatch::new("f", "false", vec![Action::command("false")]));

    assert_eq!(result.reports.len(), 1);
    assert_eq!(
        result.reports[0].status.failure_kind(),
        Some(FailureKind::ExecutionFailure)
    );
    assert_eq!(result.reports[0].output.as_ref().unwrap().exit_status, 1);
}

#[test]
fn failed_command_does_not_stop_later_file_actions() {
    let (dir, root) = workspace();
    let mut session = session(&root);
    let batch = ActionBatch::new(
        "mixed",
        "diagnostic command fails",
        vec![
            Action::command("exit 7"),
            Action::file("src/lib.rs", "pub fn answer() -> u32 { 42 }\n"),
            Action::command("test -f src/lib.rs"),
        ],
    );

    let result = session.execute(batch);

    assert!(result.reports[0].status.is_failed());
    assert!(result.reports[1].status.is_applied());
    assert!(result.reports[2].status.is_applied());
    assert_eq!(
        fs::read_to_string(dir.path().join("src/lib.rs")).unwrap(),
        "pub fn answer() -> u32 { 42 }\n"
    );
}

#[test]
fn symlink_escape_is_invalid_path() {
    let (dir, root) = workspace();
    let outside = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
    let mut session = session(&root);

    let result = session.execute(ActionBatch::new(
        "escape",
        "through a link",
        vec![Action::file("link/pwned.txt", "x"), Action::command("true")],
    ));

    assert_eq!(result.reports[0].status.failure_kind(), Some(FailureKind::InvalidPath));
    assert!(result.reports[1].status.is_skipped());
    assert!(!outside.path().join("pwned.txt").exists());
}

#[test]
fn absolute_path_under_root_is_accepted() {
    let (dir, root) = workspace();
    let mut session = session(&root);
    let absolute = format!("{}/nested/abs.txt", root.path().display());

    let result = session.execute(ActionBatch::new("abs", "absolute", vec![Action::file(absolute, "ok\n")]));

    assert!(result.is_success());
    assert_eq!(result.reports[0].path.as_deref(), Some("nested/abs.txt"));
    assert!(dir.path().join("nested/abs.txt").exists());
}

#[test]
fn remove_action_deletes_file() {
    let (dir, root) = workspace();
    let mut session = session(&root);
    session.execute(ActionBatch::new("r", "create", vec![Action::file("gone.txt", "x")]));
    let result = session.execute(ActionBatch::new("r", "remove", vec![Action::remove("gone.txt")]));

    assert!(result.is_success());
    assert!(!dir.path().join("gone.txt").exists());
    assert!(session.snapshot().is_empty());
    assert_eq!(session.batch("r").unwrap().revision, 2);
}

#[test]
fn sequencer_can_be_driven_directly() {
    let (dir, root) = workspace();
    let persistence = FsPersistence::new(root.clone());
    let executor = ShellExecutor::new(root.path());
    let mut snapshot = WorkspaceSnapshot::new();

    let result = ActionSequencer::new(&root, &mut snapshot, &persistence, &executor).execute(&ActionBatch::new(
        "direct",
        "no session",
        vec![Action::file("a.txt", "1\n"), Action::command("wc -l < a.txt")],
    ));

    assert!(result.is_success());
    assert_eq!(result.reports[1].output.as_ref().unwrap().stdout.trim(), "1");
    assert_eq!(snapshot.len(), 1);
    assert!(dir.path().join("a.txt").exists());
}
