//! Line-based patch codec.
//!
//! A [`Patch`] is an ordered list of [`Hunk`]s describing how one
//! [`FileContent`] becomes another. [`PatchCodec`] computes patches from two
//! contents, applies them back, and converts them to and from the unified-diff
//! subset carried inside `<diff>` elements:
//!
//! ```text
//! @@ -1,3 +1,4 @@
//!  a
//! -b
//! +B
//!  c
//! +d
//! ```
//!
//! No `---`/`+++` file headers are emitted. A body line without a trailing
//! newline is followed by `\ No newline at end of file`.
//!
//! Round-trip law: `apply(old, diff(old, new)) == new` for every pair of
//! contents, byte for byte.

mod apply;
mod diff;
mod format;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::content::FileContent;
use crate::error::PatchError;

pub use apply::apply_patch;
pub use diff::diff_lines;
pub use format::{parse_patch, serialize_patch, NO_NEWLINE_MARKER};

/// Unchanged lines kept on each side of a change.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Role of one line inside a hunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Context,
    Removed,
    Added,
}

impl LineKind {
    /// Leading marker character in the textual form.
    pub fn marker(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Removed => '-',
            Self::Added => '+',
        }
    }

    /// Whether the line is part of the original span.
    pub fn in_original(self) -> bool {
        matches!(self, Self::Context | Self::Removed)
    }

    /// Whether the line is part of the modified span.
    pub fn in_modified(self) -> bool {
        matches!(self, Self::Context | Self::Added)
    }
}

/// One body line. `text` keeps its terminator; only a file's last line may
/// lack one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkLine {
    pub kind: LineKind,
    pub text: String,
}

impl HunkLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// A contiguous alignment between an original span and a modified span.
///
/// Starts are 1-based. A zero count means an empty span, in which case the
/// start names the line the span follows (`0` for the top of the file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub original_start: usize,
    pub original_count: usize,
    pub modified_start: usize,
    pub modified_count: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// 0-based index of the first original line the hunk covers.
    pub fn original_index(&self) -> usize {
        if self.original_count == 0 {
            self.original_start
        } else {
            self.original_start.saturating_sub(1)
        }
    }

    /// Original lines (context and removed) in order.
    pub fn original_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|line| line.kind.in_original())
            .map(|line| line.text.as_str())
    }

    /// Modified lines (context and added) in order.
    pub fn modified_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|line| line.kind.in_modified())
            .map(|line| line.text.as_str())
    }

    /// Whether the body agrees with the declared counts.
    pub fn counts_match(&self) -> bool {
        self.original_lines().count() == self.original_count
            && self.modified_lines().count() == self.modified_count
    }

    /// Number of added plus removed lines.
    pub fn changed_lines(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| line.kind != LineKind::Context)
            .count()
    }
}

/// Ordered, non-overlapping hunks for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    hunks: Vec<Hunk>,
}

impl Patch {
    pub fn new(hunks: Vec<Hunk>) -> Self {
        Self { hunks }
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    pub fn into_hunks(self) -> Vec<Hunk> {
        self.hunks
    }

    /// A patch with no hunks leaves content unchanged.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hunks.len()
    }

    /// Total added plus removed lines across all hunks.
    pub fn changed_lines(&self) -> usize {
        self.hunks.iter().map(Hunk::changed_lines).sum()
    }

    /// The patch that undoes this one: original and modified sides swap.
    pub fn reversed(&self) -> Self {
        let hunks = self
            .hunks
            .iter()
            .map(|hunk| Hunk {
                original_start: hunk.modified_start,
                original_count: hunk.modified_count,
                modified_start: hunk.original_start,
                modified_count: hunk.original_count,
                lines: hunk
                    .lines
                    .iter()
                    .map(|line| {
                        let kind = match line.kind {
                            LineKind::Context => LineKind::Context,
                            LineKind::Removed => LineKind::Added,
                            LineKind::Added => LineKind::Removed,
                        };
                        HunkLine::new(kind, line.text.as_str())
                    })
                    .collect(),
            })
            .collect();
        Self { hunks }
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize_patch(self))
    }
}

impl FromStr for Patch {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_patch(s)
    }
}

/// Computes, applies, and (de)serializes patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchCodec {
    context_lines: usize,
}

impl Default for PatchCodec {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LINES)
    }
}

impl PatchCodec {
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }

    pub fn context_lines(&self) -> usize {
        self.context_lines
    }

    /// Minimal line patch turning `old` into `new`.
    pub fn diff(&self, old: &FileContent, new: &FileContent) -> Patch {
        Patch::new(diff_lines(&old.lines(), &new.lines(), self.context_lines))
    }

    /// Replay `patch` against `old`.
    ///
    /// # Errors
    /// `PatchConflict` if a hunk's original span does not match `old` exactly
    /// or hunks are out of order; `MalformedPatch` if a hunk body disagrees
    /// with its own counts.
    pub fn apply(&self, old: &FileContent, patch: &Patch) -> Result<FileContent, PatchError> {
        apply_patch(old, patch)
    }

    pub fn serialize(&self, patch: &Patch) -> String {
        serialize_patch(patch)
    }

    /// # Errors
    /// `MalformedPatch` on grammar or count violations.
    pub fn parse(&self, text: &str) -> Result<Patch, PatchError> {
        parse_patch(text)
    }
}
