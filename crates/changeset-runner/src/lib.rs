//! Command-line runner for the changeset engine.
//!
//! Reads a producer response from disk, executes its batch against a local
//! workspace and prints the outcome as JSON. Exit codes:
//!
//! - `0`: every action applied
//! - `1`: at least one action or modification failed
//! - `2`: the input could not be read or parsed, or the workspace is unusable

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use changeset::config::EngineConfig;
use changeset::persistence::{FsPersistence, Persistence};
use changeset::session::{ModificationOutcome, ModificationStatus};
use changeset::{
    ChangeSelector, FileContent, FilePath, Modification, Modifications, SequenceResult, Session,
};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_INVALID_INPUT: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "changeset")]
#[command(author, version, about = "Apply agent action batches to a local workspace", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Workspace root (overrides CHANGESET_WORKSPACE_ROOT)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Shell used for command actions (overrides CHANGESET_SHELL)
    #[arg(long, global = true)]
    pub shell: Option<String>,

    /// Per-command timeout in seconds, 0 for none (overrides CHANGESET_COMMAND_TIMEOUT_SECS)
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute the batch found in a response file.
    Apply {
        /// File holding the producer response
        response: PathBuf,
        /// `<modifications>` preamble replayed onto the workspace first.
        /// Entries whose result is already on disk are left as they are.
        #[arg(long)]
        modifications: Option<PathBuf>,
    },

    /// Print the cheaper representation of an edit as a `<modifications>` entry.
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Path label for the entry (defaults to NEW as given)
        #[arg(long)]
        path: Option<String>,
    },

    /// Print the batch found in a response file as JSON.
    Parse {
        response: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct ApplyReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modifications: Vec<ModificationOutcome>,
    pub result: SequenceResult,
}

impl ApplyReport {
    pub fn exit_code(&self) -> i32 {
        let modifications_ok = self
            .modifications
            .iter()
            .all(|outcome| outcome.status.is_success());
        if modifications_ok && self.result.is_success() {
            EXIT_OK
        } else {
            EXIT_FAILED
        }
    }
}

/// Defaults, then the config file, then the environment, then flags.
pub fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(workspace) = &cli.workspace {
        config.workspace_root = workspace.clone();
    }
    if let Some(shell) = &cli.shell {
        config.shell = shell.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.command_timeout_secs = (secs > 0).then_some(secs);
    }
    Ok(config)
}

/// Run one subcommand, writing its report to `out`. Returns the exit code.
///
/// Errors are input or environment problems and map to
/// [`EXIT_INVALID_INPUT`].
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<i32> {
    let config = load_config(cli)?;
    match &cli.command {
        Command::Apply { response, modifications } => {
            let report = apply(&config, response, modifications.as_deref())?;
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
            Ok(report.exit_code())
        }
        Command::Diff { old, new, path } => {
            let label = path.clone().unwrap_or_else(|| new.display().to_string());
            let rendered = diff(&config, old, new, &label)?;
            out.write_all(rendered.as_bytes())?;
            Ok(EXIT_OK)
        }
        Command::Parse { response } => {
            let text = read(response)?;
            let batch = config
                .protocol()
                .parse_batch(&text)
                .with_context(|| format!("Failed to parse {}", response.display()))?;
            serde_json::to_writer_pretty(&mut *out, &batch)?;
            writeln!(out)?;
            Ok(EXIT_OK)
        }
    }
}

pub fn apply(
    config: &EngineConfig,
    response: &Path,
    modifications: Option<&Path>,
) -> Result<ApplyReport> {
    let protocol = config.protocol();
    let text = read(response)?;
    let batch = protocol
        .parse_batch(&text)
        .with_context(|| format!("Failed to parse {}", response.display()))?;

    let preamble = match modifications {
        Some(path) => {
            let text = read(path)?;
            Some(
                protocol
                    .parse_modifications(&text)
                    .with_context(|| format!("Failed to parse {}", path.display()))?,
            )
        }
        None => None,
    };

    let mut session = Session::from_config(config).context("Failed to open workspace")?;
    info!(
        session_id = %session.id(),
        batch_id = %batch.id,
        actions = batch.len(),
        "Applying batch"
    );

    let outcomes = match preamble {
        Some(preamble) => replay_modifications(config, &mut session, &preamble)?,
        None => Vec::new(),
    };

    let result = session.execute(batch);
    for failure in result.failures() {
        warn!(index = failure.index, status = ?failure.status, "Action failed");
    }
    session.close();

    Ok(ApplyReport {
        modifications: outcomes,
        result,
    })
}

/// Seed the snapshot with the current on-disk content of every preamble path,
/// fold the preamble in and write the applied entries back. Diffs already
/// present on disk are reported without touching the file, so a workspace
/// that received the edits out-of-band replays cleanly.
fn replay_modifications(
    config: &EngineConfig,
    session: &mut Session,
    preamble: &Modifications,
) -> Result<Vec<ModificationOutcome>> {
    let paths: Vec<FilePath> = preamble
        .iter()
        .filter_map(|modification| session.root().file_path(&modification.path).ok())
        .collect();
    session
        .seed_from_persistence(&paths)
        .context("Failed to read workspace files")?;

    let outcomes = session.apply_modifications(preamble);
    let store = FsPersistence::new(config.workspace()?);
    for outcome in &outcomes {
        match outcome.status {
            ModificationStatus::Applied { .. } => {}
            ModificationStatus::AlreadyPresent { .. } => continue,
            _ => {
                warn!(path = %outcome.path, status = ?outcome.status, "Modification not applied");
                continue;
            }
        }
        let path = session.root().file_path(&outcome.path)?;
        if let Some(content) = session.snapshot().get(&path) {
            store
                .write(&path, content)
                .with_context(|| format!("Failed to write {path}"))?;
        }
    }
    Ok(outcomes)
}

pub fn diff(config: &EngineConfig, old: &Path, new: &Path, label: &str) -> Result<String> {
    let old = FileContent::new(read(old)?);
    let new = FileContent::new(read(new)?);
    let entry = ChangeSelector::new(config.codec()).select(Some(&old), &new);
    let modifications = Modifications::new(vec![Modification::new(label, entry)]);
    Ok(config.protocol().render_modifications(&modifications)?)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
