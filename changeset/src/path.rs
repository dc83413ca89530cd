//! Workspace-relative file paths and the workspace root they resolve against.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PathError};

/// A normalized, workspace-relative, case-sensitive file path.
///
/// Segments are joined with `/`. Empty and `.` segments are dropped during
/// normalization; `..` segments are rejected outright, so a `FilePath` can
/// never name anything above the workspace root lexically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilePath(String);

impl FilePath {
    /// Normalize a relative path.
    ///
    /// # Errors
    /// `Empty` when nothing remains after normalization, `ParentSegment` for
    /// any `..`, `OutsideRoot` for absolute paths (use
    /// [`WorkspaceRoot::file_path`] to accept root-prefixed absolute paths).
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.starts_with('/') {
            return Err(PathError::OutsideRoot(raw.to_string()));
        }
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::ParentSegment(raw.to_string())),
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FilePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FilePath> for String {
    fn from(path: FilePath) -> Self {
        path.0
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The directory every [`FilePath`] is resolved and bounds-checked against.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
    canonical: PathBuf,
    /// Absolute prefix the producer uses for the same directory
    /// (e.g. a container work dir); stripped like the real root.
    alias: Option<String>,
}

impl WorkspaceRoot {
    /// Open an existing directory as the workspace root.
    ///
    /// # Errors
    /// Returns `ConfigError::WorkspaceRoot` if the path cannot be
    /// canonicalized or is not a directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        let canonical = root
            .canonicalize()
            .map_err(|err| ConfigError::WorkspaceRoot {
                path: root.clone(),
                reason: err.to_string(),
            })?;
        if !canonical.is_dir() {
            return Err(ConfigError::WorkspaceRoot {
                path: root,
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self {
            root: canonical.clone(),
            canonical,
            alias: None,
        })
    }

    /// A root that is never touched on disk, for in-memory persistence.
    pub fn detached(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            canonical: root.clone(),
            root,
            alias: None,
        }
    }

    /// Also accept absolute paths under `alias` as workspace-relative.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        let trimmed = alias.trim_end_matches('/');
        self.alias = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Parse a path attribute value, reducing root-prefixed absolute paths.
    ///
    /// # Errors
    /// Same as [`FilePath::parse`]; absolute paths under neither the root nor
    /// the alias are `OutsideRoot`.
    pub fn file_path(&self, raw: &str) -> Result<FilePath, PathError> {
        if !raw.starts_with('/') {
            return FilePath::parse(raw);
        }
        let root = self.root.to_string_lossy();
        let prefixes = std::iter::once(root.trim_end_matches('/')).chain(self.alias.as_deref());
        for prefix in prefixes {
            if let Some(rest) = raw.strip_prefix(prefix) {
                if rest.starts_with('/') {
                    return FilePath::parse(rest.trim_start_matches('/'));
                }
            }
        }
        Err(PathError::OutsideRoot(raw.to_string()))
    }

    /// Join `path` onto the root and verify no existing link on the way
    /// leads outside of it.
    ///
    /// # Errors
    /// `PathError::Escapes` when the nearest existing ancestor canonicalizes
    /// to a location outside the root.
    pub fn resolve(&self, path: &FilePath) -> Result<PathBuf, PathError> {
        let candidate = self.root.join(path.as_str());
        let mut ancestor = candidate.as_path();
        loop {
            if ancestor.exists() {
                let canonical = ancestor
                    .canonicalize()
                    .map_err(|_| PathError::Escapes(path.to_string()))?;
                if !canonical.starts_with(&self.canonical) {
                    return Err(PathError::Escapes(path.to_string()));
                }
                break;
            }
            match ancestor.parent() {
                Some(parent) if parent.starts_with(&self.root) && parent != ancestor => {
                    ancestor = parent;
                }
                _ => break,
            }
        }
        Ok(candidate)
    }
}
