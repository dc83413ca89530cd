//! Engine configuration.
//!
//! Layering: defaults, then an optional TOML file, then `CHANGESET_*`
//! environment variables. Front ends apply their own flags last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::patch::{PatchCodec, DEFAULT_CONTEXT_LINES};
use crate::path::WorkspaceRoot;
use crate::protocol::{ProtocolTags, ResponseProtocol};

pub const ENV_WORKSPACE_ROOT: &str = "CHANGESET_WORKSPACE_ROOT";
pub const ENV_WORKSPACE_ALIAS: &str = "CHANGESET_WORKSPACE_ALIAS";
pub const ENV_CONTEXT_LINES: &str = "CHANGESET_CONTEXT_LINES";
pub const ENV_SHELL: &str = "CHANGESET_SHELL";
pub const ENV_COMMAND_TIMEOUT_SECS: &str = "CHANGESET_COMMAND_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory every path is resolved and bounds-checked against.
    pub workspace_root: PathBuf,
    /// Absolute prefix the producer uses for the workspace (e.g. a container
    /// work dir). Paths under it are treated as workspace-relative.
    pub workspace_alias: Option<String>,
    /// Unchanged lines around each hunk.
    pub context_lines: usize,
    pub shell: String,
    /// Per-command timeout enforced by the shell executor.
    pub command_timeout_secs: Option<u64>,
    pub tags: ProtocolTags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            workspace_alias: None,
            context_lines: DEFAULT_CONTEXT_LINES,
            shell: "sh".to_string(),
            command_timeout_secs: None,
            tags: ProtocolTags::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `path` (if given) and then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; unparsable numbers are an error.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(root) = lookup(ENV_WORKSPACE_ROOT) {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(alias) = lookup(ENV_WORKSPACE_ALIAS) {
            self.workspace_alias = Some(alias).filter(|a| !a.is_empty());
        }
        if let Some(lines) = lookup(ENV_CONTEXT_LINES) {
            self.context_lines = parse_number(ENV_CONTEXT_LINES, &lines)?;
        }
        if let Some(shell) = lookup(ENV_SHELL) {
            self.shell = shell;
        }
        if let Some(secs) = lookup(ENV_COMMAND_TIMEOUT_SECS) {
            // 0 disables the timeout.
            let secs: u64 = parse_number(ENV_COMMAND_TIMEOUT_SECS, &secs)?;
            self.command_timeout_secs = (secs > 0).then_some(secs);
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn codec(&self) -> PatchCodec {
        PatchCodec::new(self.context_lines)
    }

    pub fn protocol(&self) -> ResponseProtocol {
        ResponseProtocol::new(self.tags.clone())
    }

    /// Open the configured root, with the alias applied.
    pub fn workspace(&self) -> Result<WorkspaceRoot, ConfigError> {
        let root = WorkspaceRoot::open(&self.workspace_root)?;
        Ok(match &self.workspace_alias {
            Some(alias) => root.with_alias(alias.as_str()),
            None => root,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
