//! Ordered execution of an [`ActionBatch`].
//!
//! Actions run strictly in document order on the caller's thread. A command
//! blocks the loop until the executor returns. Failure policy is
//! fatal-by-position:
//!
//! - a file or remove action that fails (invalid path, persistence failure)
//!   halts the batch, and every later action is `Skipped`;
//! - a command that exits non-zero, times out, or whose executor is
//!   unavailable is `Failed` but the batch continues;
//! - cancellation is checked before each action. An in-flight command that
//!   observes it is `Failed` with kind `Cancelled`, and everything after it is
//!   `Skipped`.
//!
//! Nothing is rolled back: actions already `Applied` stay applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionBatch, ActionKind};
use crate::content::FileContent;
use crate::error::{ExecutorError, FailureKind};
use crate::executor::{CommandExecutor, CommandOutput};
use crate::path::{FilePath, WorkspaceRoot};
use crate::persistence::Persistence;
use crate::snapshot::WorkspaceSnapshot;

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Applied,
    Failed { kind: FailureKind, reason: String },
    Skipped,
}

impl ActionStatus {
    fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub index: usize,
    pub action: ActionKind,
    /// Normalized path for file and remove actions, raw text if it was invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub status: ActionStatus,
    /// Snapshot revision written by a successful file action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<CommandOutput>,
}

impl ActionReport {
    fn new(index: usize, action: &Action, status: ActionStatus) -> Self {
        Self {
            index,
            action: action.kind(),
            path: action.path().map(str::to_string),
            status,
            revision: None,
            output: None,
        }
    }
}

/// Per-action record of one batch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceResult {
    pub batch_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether cancellation was observed during this execution.
    pub cancelled: bool,
    pub reports: Vec<ActionReport>,
}

impl SequenceResult {
    /// True when every action was applied.
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.status.is_applied())
    }

    pub fn statuses(&self) -> Vec<&ActionStatus> {
        self.reports.iter().map(|r| &r.status).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionReport> {
        self.reports.iter().filter(|r| r.status.is_failed())
    }

    pub fn applied_count(&self) -> usize {
        self.reports.iter().filter(|r| r.status.is_applied()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.reports.iter().filter(|r| r.status.is_skipped()).count()
    }

    /// Index of the action whose failure halted the batch, if any.
    pub fn halted_at(&self) -> Option<usize> {
        self.reports
            .iter()
            .find(|r| r.status.failure_kind().is_some_and(FailureKind::halts_batch))
            .map(|r| r.index)
    }
}

/// Executes batches against a snapshot and the two external collaborators.
pub struct ActionSequencer<'a> {
    root: &'a WorkspaceRoot,
    snapshot: &'a mut WorkspaceSnapshot,
    persistence: &'a dyn Persistence,
    executor: &'a dyn CommandExecutor,
    cancel: CancellationToken,
}

impl<'a> ActionSequencer<'a> {
    pub fn new(
        root: &'a WorkspaceRoot,
        snapshot: &'a mut WorkspaceSnapshot,
        persistence: &'a dyn Persistence,
        executor: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            root,
            snapshot,
            persistence,
            executor,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `cancel` between actions and hand it to the executor.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn execute(&mut self, batch: &ActionBatch) -> SequenceResult {
        let started_at = Utc::now();
        info!(batch_id = %batch.id, title = %batch.title, actions = batch.len(), "Executing batch");

        let mut reports = Vec::with_capacity(batch.len());
        let mut halted = false;
        let mut cancelled = false;

        for (index, action) in batch.actions.iter().enumerate() {
            if halted || cancelled {
                reports.push(ActionReport::new(index, action, ActionStatus::Skipped));
                continue;
            }
            if self.cancel.is_cancelled() {
                info!(batch_id = %batch.id, index, "Batch cancelled; skipping remaining actions");
                cancelled = true;
                reports.push(ActionReport::new(index, action, ActionStatus::Skipped));
                continue;
            }

            let report = match action {
                Action::File { path, content } => self.write_file(index, action, path, content),
                Action::Remove { path } => self.remove_file(index, action, path),
                Action::Command { command_line } => self.run_command(index, action, command_line),
            };

            match &report.status {
                ActionStatus::Applied => {
                    debug!(batch_id = %batch.id, index, action = %report.action, "Action applied");
                }
                ActionStatus::Failed { kind, reason } => {
                    warn!(batch_id = %batch.id, index, action = %report.action, kind = %kind, reason = %reason, "Action failed");
                    if kind.halts_batch() {
                        warn!(batch_id = %batch.id, index, "Halting batch after failed file action");
                        halted = true;
                    }
                    if *kind == FailureKind::Cancelled {
                        cancelled = true;
                    }
                }
                ActionStatus::Skipped => {}
            }
            reports.push(report);
        }

        let result = SequenceResult {
            batch_id: batch.id.clone(),
            title: batch.title.clone(),
            started_at,
            finished_at: Utc::now(),
            cancelled,
            reports,
        };
        info!(
            batch_id = %batch.id,
            applied = result.applied_count(),
            failed = result.failures().count(),
            skipped = result.skipped_count(),
            "Batch finished"
        );
        result
    }

    fn checked_path(&self, raw: &str) -> Result<FilePath, String> {
        let path = self.root.file_path(raw).map_err(|e| e.to_string())?;
        self.root.resolve(&path).map_err(|e| e.to_string())?;
        Ok(path)
    }

    fn write_file(&mut self, index: usize, action: &Action, raw: &str, content: &FileContent) -> ActionReport {
        let path = match self.checked_path(raw) {
            Ok(path) => path,
            Err(reason) => {
                return ActionReport::new(index, action, ActionStatus::failed(FailureKind::InvalidPath, reason));
            }
        };
        if let Err(e) = self.persistence.write(&path, content) {
            let mut report =
                ActionReport::new(index, action, ActionStatus::failed(FailureKind::PersistenceFailure, e.to_string()));
            report.path = Some(path.to_string());
            return report;
        }
        let revision = self.snapshot.put(path.clone(), content.clone());
        debug!(path = %path, revision, bytes = content.len(), "Snapshot updated");

        let mut report = ActionReport::new(index, action, ActionStatus::Applied);
        report.path = Some(path.to_string());
        report.revision = Some(revision);
        report
    }

    fn remove_file(&mut self, index: usize, action: &Action, raw: &str) -> ActionReport {
        let path = match self.checked_path(raw) {
            Ok(path) => path,
            Err(reason) => {
                return ActionReport::new(index, action, ActionStatus::failed(FailureKind::InvalidPath, reason));
            }
        };
        let mut report = match self.persistence.remove(&path) {
            Ok(()) => {
                self.snapshot.remove(&path);
                debug!(path = %path, "Snapshot entry removed");
                ActionReport::new(index, action, ActionStatus::Applied)
            }
            Err(e) => ActionReport::new(
                index,
                action,
                ActionStatus::failed(FailureKind::PersistenceFailure, e.to_string()),
            ),
        };
        report.path = Some(path.to_string());
        report
    }

    fn run_command(&mut self, index: usize, action: &Action, command_line: &str) -> ActionReport {
        debug!(index, command = command_line, "Running command");
        let (status, output) = match self.executor.run(command_line, &self.cancel) {
            Ok(output) if output.success() => (ActionStatus::Applied, Some(output)),
            Ok(output) => (
                ActionStatus::failed(
                    FailureKind::ExecutionFailure,
                    format!("command exited with status {}", output.exit_status),
                ),
                Some(output),
            ),
            Err(ExecutorError::Cancelled) => (
                ActionStatus::failed(FailureKind::Cancelled, "cancelled while running"),
                None,
            ),
            Err(e @ ExecutorError::Timeout { .. }) => {
                (ActionStatus::failed(FailureKind::ExecutionFailure, e.to_string()), None)
            }
            Err(e) => (
                ActionStatus::failed(FailureKind::ExecutionUnavailable, e.to_string()),
                None,
            ),
        };
        let mut report = ActionReport::new(index, action, status);
        report.output = output;
        report
    }
}
