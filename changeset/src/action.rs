//! Batches of actions and modification preambles.
//!
//! Paths are carried as the producer wrote them. They are validated against
//! the workspace root only when an action runs, so an invalid path fails its
//! own action instead of rejecting the whole batch.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::FileContent;
use crate::patch::Patch;

/// One step of a batch. Order inside a batch is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Replace (or create) a file with the complete literal content.
    File { path: String, content: FileContent },
    /// Opaque shell invocation.
    Command { command_line: String },
    /// Delete a file.
    Remove { path: String },
}

impl Action {
    pub fn file(path: impl Into<String>, content: impl Into<FileContent>) -> Self {
        Self::File {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn command(command_line: impl Into<String>) -> Self {
        Self::Command {
            command_line: command_line.into(),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::File { .. } => ActionKind::File,
            Self::Command { .. } => ActionKind::Command,
            Self::Remove { .. } => ActionKind::Remove,
        }
    }

    /// The path a file or remove action targets.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::File { path, .. } | Self::Remove { path } => Some(path),
            Self::Command { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    File,
    Command,
    Remove,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Command => write!(f, "command"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// An ordered set of actions proposed together.
///
/// `id` is stable across revisions of the same logical change-set; a revised
/// batch carries the full action list and replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBatch {
    pub id: String,
    pub title: String,
    pub actions: Vec<Action>,
}

impl ActionBatch {
    pub fn new(id: impl Into<String>, title: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            actions,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// How a prior edit to one path is communicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModificationEntry {
    Diff { patch: Patch },
    Full { content: FileContent },
}

impl ModificationEntry {
    pub fn is_diff(&self) -> bool {
        matches!(self, Self::Diff { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub path: String,
    pub entry: ModificationEntry,
}

impl Modification {
    pub fn new(path: impl Into<String>, entry: ModificationEntry) -> Self {
        Self {
            path: path.into(),
            entry,
        }
    }
}

/// A `<modifications>` preamble: edits applied out-of-band since last turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifications {
    entries: Vec<Modification>,
}

impl Modifications {
    pub fn new(entries: Vec<Modification>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, modification: Modification) {
        self.entries.push(modification);
    }

    pub fn entries(&self) -> &[Modification] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Modification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Modifications {
    type Item = Modification;
    type IntoIter = std::vec::IntoIter<Modification>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Modifications {
    type Item = &'a Modification;
    type IntoIter = std::slice::Iter<'a, Modification>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Modification> for Modifications {
    fn from_iter<I: IntoIterator<Item = Modification>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
