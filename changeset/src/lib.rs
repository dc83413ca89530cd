//! Changeset engine
//!
//! Applies change-sets proposed by an external producer (typically a language
//! model) to a workspace, and tells the producer what changed since its last
//! turn as cheaply as possible.
//!
//! # Components
//!
//! - [`patch::PatchCodec`]: minimal line diffs grouped into hunks, exact
//!   application with conflict detection, and the hunk text format.
//! - [`selector::ChangeSelector`]: picks a diff or the full content for a file
//!   edit, whichever is strictly shorter.
//! - [`snapshot::WorkspaceSnapshot`]: latest known content per path; the base
//!   for the next diff.
//! - [`sequencer::ActionSequencer`]: runs an [`action::ActionBatch`] in order
//!   with a fatal-by-position failure policy.
//! - [`protocol::ResponseProtocol`]: parses and renders the tagged-block
//!   envelope (`<batch>`, `<action>`, `<modifications>`).
//! - [`session::Session`]: ties a snapshot to its collaborators for the
//!   lifetime of one conversation.
//!
//! # Example
//!
//! ```no_run
//! use changeset::config::EngineConfig;
//! use changeset::session::Session;
//!
//! # fn main() -> changeset::ChangesetResult<()> {
//! let config = EngineConfig::load(None)?;
//! let mut session = Session::from_config(&config)?;
//! let batch = config.protocol().parse_batch(
//!     r#"<batch id="hello" title="Say hello">
//!          <action kind="file" path="hello.txt">hello
//! </action>
//!          <action kind="command">cat hello.txt</action>
//!        </batch>"#,
//! )?;
//! let result = session.execute(batch);
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod config;
pub mod content;
pub mod error;
pub mod executor;
pub mod patch;
pub mod path;
pub mod persistence;
pub mod protocol;
pub mod selector;
pub mod sequencer;
pub mod session;
pub mod snapshot;

pub use action::{Action, ActionBatch, ActionKind, Modification, ModificationEntry, Modifications};
pub use content::FileContent;
pub use error::{ChangesetError, ChangesetResult, FailureKind};
pub use patch::{Hunk, HunkLine, LineKind, Patch, PatchCodec};
pub use path::{FilePath, WorkspaceRoot};
pub use protocol::{ProtocolTags, ResponseProtocol};
pub use selector::ChangeSelector;
pub use sequencer::{ActionReport, ActionSequencer, ActionStatus, SequenceResult};
pub use session::Session;
pub use snapshot::{SnapshotEntry, WorkspaceSnapshot};

/// Re-exported so callers can cancel batches without naming the crate.
pub use tokio_util::sync::CancellationToken;
