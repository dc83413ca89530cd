//! Immutable file content with a line view.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte-exact text of a file.
///
/// Lines are addressed through [`FileContent::lines`], where every line keeps
/// its terminator (`\n` or `\r\n`). Only the final line may lack one, which is
/// how a file without a trailing newline is told apart from one with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileContent(String);

impl FileContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Rebuild content from terminated lines.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self(lines.into_iter().collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lines including their terminators.
    pub fn lines(&self) -> Vec<&str> {
        self.0.split_inclusive('\n').collect()
    }

    pub fn line_count(&self) -> usize {
        self.0.split_inclusive('\n').count()
    }

    /// Whether the last line is terminated (vacuously true when empty).
    pub fn ends_with_newline(&self) -> bool {
        self.0.is_empty() || self.0.ends_with('\n')
    }
}

impl fmt::Display for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl AsRef<str> for FileContent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
