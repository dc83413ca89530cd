//! External persistence contract plus filesystem and in-memory stores.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::content::FileContent;
use crate::error::PersistenceError;
use crate::path::{FilePath, WorkspaceRoot};

/// Where file actions land. The snapshot is only updated after `write`
/// succeeds.
pub trait Persistence {
    fn write(&self, path: &FilePath, content: &FileContent) -> Result<(), PersistenceError>;

    /// `Ok(None)` when the file does not exist.
    fn read(&self, path: &FilePath) -> Result<Option<FileContent>, PersistenceError>;

    /// Removing an absent file is not an error.
    fn remove(&self, path: &FilePath) -> Result<(), PersistenceError>;
}

impl<P: Persistence + ?Sized> Persistence for Box<P> {
    fn write(&self, path: &FilePath, content: &FileContent) -> Result<(), PersistenceError> {
        (**self).write(path, content)
    }

    fn read(&self, path: &FilePath) -> Result<Option<FileContent>, PersistenceError> {
        (**self).read(path)
    }

    fn remove(&self, path: &FilePath) -> Result<(), PersistenceError> {
        (**self).remove(path)
    }
}

/// Writes files under a workspace root, creating parent directories.
#[derive(Debug, Clone)]
pub struct FsPersistence {
    root: WorkspaceRoot,
}

impl FsPersistence {
    pub fn new(root: WorkspaceRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &WorkspaceRoot {
        &self.root
    }
}

impl Persistence for FsPersistence {
    fn write(&self, path: &FilePath, content: &FileContent) -> Result<(), PersistenceError> {
        let target = self
            .root
            .resolve(path)
            .map_err(|e| PersistenceError::Rejected(e.to_string()))?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, content.as_str()).map_err(|source| PersistenceError::Write {
            path: target.clone(),
            source,
        })?;
        debug!(path = %path, bytes = content.len(), "Wrote file");
        Ok(())
    }

    fn read(&self, path: &FilePath) -> Result<Option<FileContent>, PersistenceError> {
        let target = self
            .root
            .resolve(path)
            .map_err(|e| PersistenceError::Rejected(e.to_string()))?;
        match fs::read_to_string(&target) {
            Ok(text) => Ok(Some(FileContent::new(text))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Read {
                path: target,
                source,
            }),
        }
    }

    fn remove(&self, path: &FilePath) -> Result<(), PersistenceError> {
        let target = self
            .root
            .resolve(path)
            .map_err(|e| PersistenceError::Rejected(e.to_string()))?;
        match fs::remove_file(&target) {
            Ok(()) => {
                debug!(path = %path, "Removed file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Remove {
                path: target,
                source,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<FilePath, FileContent>,
    rejected: BTreeSet<FilePath>,
}

/// In-memory store. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write to `path` fail.
    pub fn reject(&self, path: FilePath) {
        self.lock().rejected.insert(path);
    }

    pub fn insert(&self, path: FilePath, content: FileContent) {
        self.lock().files.insert(path, content);
    }

    pub fn get(&self, path: &FilePath) -> Option<FileContent> {
        self.lock().files.get(path).cloned()
    }

    pub fn files(&self) -> BTreeMap<FilePath, FileContent> {
        self.lock().files.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Persistence for MemoryPersistence {
    fn write(&self, path: &FilePath, content: &FileContent) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        if state.rejected.contains(path) {
            return Err(PersistenceError::Rejected(format!("write to {path} rejected")));
        }
        state.files.insert(path.clone(), content.clone());
        Ok(())
    }

    fn read(&self, path: &FilePath) -> Result<Option<FileContent>, PersistenceError> {
        Ok(self.get(path))
    }

    fn remove(&self, path: &FilePath) -> Result<(), PersistenceError> {
        self.lock().files.remove(path);
        Ok(())
    }
}
