//! Error types for the changeset engine.
//!
//! Structural failures (`MalformedBatch`, `MalformedPatch`) and base mismatches
//! (`PatchConflict`) surface as `Err` values before anything is executed.
//! Per-action failures during sequencing are *not* errors: they are recorded in
//! [`crate::sequencer::SequenceResult`] with their index and [`FailureKind`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for engine operations.
pub type ChangesetResult<T> = Result<T, ChangesetError>;

/// Umbrella error for every fallible engine operation.
#[derive(Debug, Error)]
pub enum ChangesetError {
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures while parsing or applying a unified-diff patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The patch text does not follow the hunk grammar.
    #[error("malformed patch at line {line}: {message}")]
    MalformedPatch { line: usize, message: String },

    /// The patch was computed against a different base than the one supplied.
    #[error("patch conflict in hunk {hunk} at original line {line}: {message}")]
    PatchConflict {
        hunk: usize,
        line: usize,
        message: String,
    },
}

impl PatchError {
    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedPatch {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn conflict(hunk: usize, line: usize, message: impl Into<String>) -> Self {
        Self::PatchConflict {
            hunk,
            line,
            message: message.into(),
        }
    }

    /// Whether the caller should fall back to a full-content representation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::PatchConflict { .. })
    }
}

/// Failures in the tagged-block envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The batch container or one of its children is structurally invalid.
    #[error("malformed batch at line {line}, column {column}: {message}")]
    MalformedBatch {
        line: usize,
        column: usize,
        message: String,
    },

    /// A `<diff>` entry carried a patch that failed to parse.
    #[error("malformed diff for `{path}`: {source}")]
    MalformedDiff { path: String, source: PatchError },

    /// A body cannot be rendered so that it parses back unchanged.
    #[error("cannot embed {target}: {reason}")]
    Unrepresentable { target: String, reason: String },
}

/// A path that is empty, absolute outside the workspace, or climbs out of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("path `{0}` contains a `..` segment")]
    ParentSegment(String),

    #[error("absolute path `{0}` is outside the workspace root")]
    OutsideRoot(String),

    #[error("path `{0}` resolves outside the workspace root through a link")]
    Escapes(String),
}

/// Failures reported by a [`crate::executor::CommandExecutor`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor could not be reached or could not start the command.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// The command was stopped because the batch was cancelled.
    #[error("command cancelled")]
    Cancelled,

    /// The executor's own timeout fired.
    #[error("command timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a [`crate::persistence::Persistence`] collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Rejected(String),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("workspace root {path} is not usable: {reason}")]
    WorkspaceRoot { path: PathBuf, reason: String },
}

/// Classification of a failed action inside a sequence result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The file path escapes the workspace root. Fatal by position.
    InvalidPath,
    /// The persistence collaborator refused or failed the write. Fatal by position.
    PersistenceFailure,
    /// The command completed with a non-zero status.
    ExecutionFailure,
    /// The executor could not run the command.
    ExecutionUnavailable,
    /// The batch was cancelled while this action was in flight.
    Cancelled,
}

impl FailureKind {
    /// Whether a failure of this kind halts every later action in the batch.
    pub fn halts_batch(self) -> bool {
        matches!(self, Self::InvalidPath | Self::PersistenceFailure)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath => write!(f, "invalid_path"),
            Self::PersistenceFailure => write!(f, "persistence_failure"),
            Self::ExecutionFailure => write!(f, "execution_failure"),
            Self::ExecutionUnavailable => write!(f, "execution_unavailable"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
