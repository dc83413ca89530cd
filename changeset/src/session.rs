//! Session-scoped engine state.
//!
//! A [`Session`] owns one [`WorkspaceSnapshot`] and the collaborators used to
//! execute batches against it. Nothing is shared between sessions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::{ActionBatch, Modification, ModificationEntry, Modifications};
use crate::config::EngineConfig;
use crate::content::FileContent;
use crate::error::{ChangesetResult, PersistenceError};
use crate::executor::{CommandExecutor, ShellExecutor};
use crate::patch::PatchCodec;
use crate::path::{FilePath, WorkspaceRoot};
use crate::persistence::{FsPersistence, Persistence};
use crate::selector::ChangeSelector;
use crate::sequencer::{ActionSequencer, SequenceResult};
use crate::snapshot::WorkspaceSnapshot;

/// Latest intent registered for a batch id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch: ActionBatch,
    /// 1 for the first submission of this id, +1 for every revision.
    pub revision: u64,
    pub last_result: Option<SequenceResult>,
}

/// Result of folding one preamble entry into the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModificationStatus {
    Applied { revision: u64 },
    /// The snapshot base already holds the diff's result; nothing changed.
    AlreadyPresent { revision: u64 },
    /// The diff did not match the snapshot base; the path was left untouched.
    Conflict { reason: String },
    InvalidPath { reason: String },
}

impl ModificationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::AlreadyPresent { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationOutcome {
    pub path: String,
    pub status: ModificationStatus,
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    root: WorkspaceRoot,
    snapshot: WorkspaceSnapshot,
    persistence: Box<dyn Persistence>,
    executor: Box<dyn CommandExecutor>,
    selector: ChangeSelector,
    batches: HashMap<String, BatchRecord>,
}

impl Session {
    pub fn new(
        root: WorkspaceRoot,
        persistence: impl Persistence + 'static,
        executor: impl CommandExecutor + 'static,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(session_id = %id, root = %root.path().display(), "Session started");
        Self {
            id,
            created_at: Utc::now(),
            root,
            snapshot: WorkspaceSnapshot::new(),
            persistence: Box::new(persistence),
            executor: Box::new(executor),
            selector: ChangeSelector::default(),
            batches: HashMap::new(),
        }
    }

    /// Session over the local filesystem and the configured shell.
    pub fn from_config(config: &EngineConfig) -> ChangesetResult<Self> {
        let root = config.workspace()?;
        let executor = ShellExecutor::new(root.path())
            .with_shell(config.shell.clone())
            .with_timeout(config.command_timeout());
        let persistence = FsPersistence::new(root.clone());
        Ok(Self::new(root, persistence, executor).with_codec(config.codec()))
    }

    #[must_use]
    pub fn with_codec(mut self, codec: PatchCodec) -> Self {
        self.selector = ChangeSelector::new(codec);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn root(&self) -> &WorkspaceRoot {
        &self.root
    }

    pub fn snapshot(&self) -> &WorkspaceSnapshot {
        &self.snapshot
    }

    pub fn codec(&self) -> &PatchCodec {
        self.selector.codec()
    }

    pub fn batch(&self, id: &str) -> Option<&BatchRecord> {
        self.batches.get(id)
    }

    /// Execute `batch`, replacing any earlier batch with the same id.
    pub fn execute(&mut self, batch: ActionBatch) -> SequenceResult {
        self.execute_with_cancel(batch, CancellationToken::new())
    }

    /// Like [`Session::execute`], observing `cancel` between actions and
    /// during commands.
    pub fn execute_with_cancel(&mut self, batch: ActionBatch, cancel: CancellationToken) -> SequenceResult {
        let revision = self.batches.get(&batch.id).map_or(1, |record| record.revision + 1);
        if revision > 1 {
            info!(session_id = %self.id, batch_id = %batch.id, revision, "Batch revised; replacing earlier intent");
        }

        let result = ActionSequencer::new(&self.root, &mut self.snapshot, &*self.persistence, &*self.executor)
            .with_cancellation(cancel)
            .execute(&batch);

        self.batches.insert(
            batch.id.clone(),
            BatchRecord {
                batch,
                revision,
                last_result: Some(result.clone()),
            },
        );
        result
    }

    /// Fold a preamble of edits already applied out-of-band into the
    /// snapshot. Diffs apply against the snapshot base (empty when the path
    /// is unknown). A diff that does not apply but whose reverse does is
    /// already reflected in the base and reported as such. Nothing is written
    /// through persistence.
    pub fn apply_modifications(&mut self, modifications: &Modifications) -> Vec<ModificationOutcome> {
        modifications
            .iter()
            .map(|modification| {
                let status = self.apply_modification(modification);
                ModificationOutcome {
                    path: modification.path.clone(),
                    status,
                }
            })
            .collect()
    }

    fn apply_modification(&mut self, modification: &Modification) -> ModificationStatus {
        let path = match self.root.file_path(&modification.path) {
            Ok(path) => path,
            Err(e) => {
                warn!(path = %modification.path, error = %e, "Rejected modification path");
                return ModificationStatus::InvalidPath { reason: e.to_string() };
            }
        };
        let content = match &modification.entry {
            ModificationEntry::Full { content } => content.clone(),
            ModificationEntry::Diff { patch } => {
                let base = self.snapshot.get(&path).cloned().unwrap_or_default();
                match self.selector.codec().apply(&base, patch) {
                    Ok(content) => content,
                    Err(e) => {
                        if let Some(revision) = self.snapshot.revision(&path) {
                            if self.selector.codec().apply(&base, &patch.reversed()).is_ok() {
                                debug!(path = %path, revision, "Modification already present in snapshot");
                                return ModificationStatus::AlreadyPresent { revision };
                            }
                        }
                        warn!(path = %path, error = %e, "Modification does not apply to snapshot base");
                        return ModificationStatus::Conflict { reason: e.to_string() };
                    }
                }
            }
        };
        let revision = self.snapshot.put(path.clone(), content);
        debug!(path = %path, revision, "Modification folded into snapshot");
        ModificationStatus::Applied { revision }
    }

    /// Build the next preamble from `current` file contents, choosing the
    /// cheaper representation per path, and advance the snapshot. Paths
    /// whose content matches the snapshot are omitted.
    pub fn collect_modifications<I>(&mut self, current: I) -> Modifications
    where
        I: IntoIterator<Item = (FilePath, FileContent)>,
    {
        let mut modifications = Modifications::default();
        for (path, content) in current {
            let old = self.snapshot.get(&path);
            if old == Some(&content) {
                continue;
            }
            let entry = self.selector.select(old, &content);
            debug!(path = %path, diff = entry.is_diff(), "Collected modification");
            modifications.push(Modification::new(path.to_string(), entry));
            self.snapshot.put(path, content);
        }
        modifications
    }

    /// Seed the snapshot from persistence for `paths`. Returns how many
    /// existed.
    pub fn seed_from_persistence<'p, I>(&mut self, paths: I) -> Result<usize, PersistenceError>
    where
        I: IntoIterator<Item = &'p FilePath>,
    {
        let mut seeded = 0;
        for path in paths {
            if let Some(content) = self.persistence.read(path)? {
                self.snapshot.put(path.clone(), content);
                seeded += 1;
            }
        }
        debug!(session_id = %self.id, seeded, "Snapshot seeded from persistence");
        Ok(seeded)
    }

    /// End the session: the snapshot and batch registry are cleared.
    pub fn close(&mut self) {
        info!(
            session_id = %self.id,
            files = self.snapshot.len(),
            batches = self.batches.len(),
            "Session closed"
        );
        self.snapshot.clear();
        self.batches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::error::ExecutorError;
    use crate::executor::CommandOutput;
    use crate::persistence::MemoryPersistence;
    use crate::sequencer::ActionStatus;

    struct NoopExecutor;

    impl CommandExecutor for NoopExecutor {
        fn run(&self, _: &str, _: &CancellationToken) -> Result<CommandOutput, ExecutorError> {
            Ok(CommandOutput::default())
        }
    }

    fn session() -> (Session, MemoryPersistence) {
        let store = MemoryPersistence::new();
        let session = Session::new(WorkspaceRoot::detached("/nonexistent/ws"), store.clone(), NoopExecutor);
        (session, store)
    }

    fn p(raw: &str) -> FilePath {
        FilePath::parse(raw).unwrap()
    }

    #[test]
    fn revised_batch_replaces_earlier_intent() {
        let (mut session, _) = session();
        session.execute(ActionBatch::new("b", "v1", vec![Action::file("a.txt", "1")]));
        session.execute(ActionBatch::new("b", "v2", vec![Action::file("a.txt", "2"), Action::command("true")]));

        let record = session.batch("b").unwrap();
        assert_eq!(record.revision, 2);
        assert_eq!(record.batch.title, "v2");
        assert_eq!(record.batch.len(), 2);
        assert_eq!(session.snapshot().revision(&p("a.txt")), Some(2));
    }

    #[test]
    fn modifications_apply_against_snapshot() {
        let (mut session, store) = session();
        session.execute(ActionBatch::new("b", "t", vec![Action::file("a.txt", "a\nb\nc\n")]));

        let patch = session.codec().diff(&"a\nb\nc\n".into(), &"a\nB\nc\n".into());
        let mods = Modifications::new(vec![
            Modification::new("a.txt", ModificationEntry::Diff { patch }),
            Modification::new("/etc/passwd", ModificationEntry::Full { content: "x".into() }),
        ]);
        let outcomes = session.apply_modifications(&mods);

        assert_eq!(outcomes[0].status, ModificationStatus::Applied { revision: 2 });
        assert!(matches!(outcomes[1].status, ModificationStatus::InvalidPath { .. }));
        assert_eq!(session.snapshot().get(&p("a.txt")).unwrap().as_str(), "a\nB\nc\n");
        // Out-of-band edits are not written again.
        assert_eq!(store.get(&p("a.txt")).unwrap().as_str(), "a\nb\nc\n");
    }

    #[test]
    fn conflicting_modification_leaves_path_untouched() {
        let (mut session, _) = session();
        session.execute(ActionBatch::new("b", "t", vec![Action::file("a.txt", "x\n")]));
        let patch = session.codec().diff(&"a\nb\n".into(), &"a\nc\n".into());
        let outcomes = session.apply_modifications(&Modifications::new(vec![Modification::new(
            "a.txt",
            ModificationEntry::Diff { patch },
        )]));

        assert!(matches!(outcomes[0].status, ModificationStatus::Conflict { .. }));
        assert_eq!(session.snapshot().get(&p("a.txt")).unwrap().as_str(), "x\n");
        assert_eq!(session.snapshot().revision(&p("a.txt")), Some(1));
    }

    #[test]
    fn modification_already_in_base_is_recognised() {
        let (mut session, _) = session();
        session.execute(ActionBatch::new("b", "t", vec![Action::file("a.txt", "a\nB\nc\n")]));
        let patch = session.codec().diff(&"a\nb\nc\n".into(), &"a\nB\nc\n".into());
        let outcomes = session.apply_modifications(&Modifications::new(vec![Modification::new(
            "a.txt",
            ModificationEntry::Diff { patch },
        )]));

        assert_eq!(outcomes[0].status, ModificationStatus::AlreadyPresent { revision: 1 });
        assert!(outcomes[0].status.is_success());
        assert_eq!(session.snapshot().get(&p("a.txt")).unwrap().as_str(), "a\nB\nc\n");
    }

    #[test]
    fn collect_skips_unchanged_and_advances_snapshot() {
        let (mut session, _) = session();
        let big: String = (0..100).map(|i| format!("line {i}\n")).collect();
        session.execute(ActionBatch::new(
            "b",
            "t",
            vec![Action::file("big.txt", big.as_str()), Action::file("same.txt", "s\n")],
        ));

        let edited = big.replace("line 50\n", "LINE 50\n");
        let mods = session.collect_modifications(vec![
            (p("big.txt"), FileContent::from(edited.as_str())),
            (p("same.txt"), FileContent::from("s\n")),
            (p("new.txt"), FileContent::from("n\n")),
        ]);

        assert_eq!(mods.len(), 2);
        assert!(mods.entries()[0].entry.is_diff());
        assert!(!mods.entries()[1].entry.is_diff());
        assert_eq!(session.snapshot().get(&p("big.txt")).unwrap().as_str(), edited);

        // A second collection with the same content yields nothing.
        let again = session.collect_modifications(vec![(p("big.txt"), FileContent::from(edited.as_str()))]);
        assert!(again.is_empty());
    }

    #[test]
    fn seed_and_close() {
        let (mut session, store) = session();
        store.insert(p("a.txt"), "seeded".into());
        let seeded = session.seed_from_persistence([&p("a.txt"), &p("missing.txt")]).unwrap();
        assert_eq!(seeded, 1);
        assert_eq!(session.snapshot().revision(&p("a.txt")), Some(1));

        session.execute(ActionBatch::new("b", "t", vec![Action::command("true")]));
        session.close();
        assert!(session.snapshot().is_empty());
        assert!(session.batch("b").is_none());
    }

    #[test]
    fn cancelled_execution_is_recorded() {
        let (mut session, _) = session();
        let token = CancellationToken::new();
        token.cancel();
        let result = session.execute_with_cancel(ActionBatch::new("b", "t", vec![Action::file("a.txt", "x")]), token);
        assert!(result.cancelled);
        assert_eq!(result.reports[0].status, ActionStatus::Skipped);
        assert!(session.batch("b").unwrap().last_result.as_ref().unwrap().cancelled);
    }
}
