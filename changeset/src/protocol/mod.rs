//! Tagged-block envelope for batches and modification preambles.
//!
//! ```text
//! <batch id="todo-app" title="Create todo app">
//!   <action kind="file" path="index.js">
//!   ...complete file content...
//!   </action>
//!   <action kind="command">node index.js</action>
//! </batch>
//!
//! <modifications>
//!   <diff path="index.js">
//!   @@ -1,3 +1,4 @@
//!   ...
//!   </diff>
//!   <file path="README.md">...</file>
//! </modifications>
//! ```
//!
//! Text outside the container is ignored. Unknown child tags are skipped.
//! An unknown action kind is a [`ProtocolError::MalformedBatch`].

mod render;
mod scanner;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{Action, ActionBatch, Modification, ModificationEntry, Modifications};
use crate::content::FileContent;
use crate::error::ProtocolError;
use crate::patch::parse_patch;

use scanner::{Child, Scanner};

const KIND_ATTRS: &[&str] = &["kind", "type"];
const PATH_ATTRS: &[&str] = &["path", "filePath"];
const DIFF_TAG: &str = "diff";
const FILE_TAG: &str = "file";

/// Container tag names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTags {
    pub batch: String,
    pub action: String,
    pub modifications: String,
}

impl Default for ProtocolTags {
    fn default() -> Self {
        Self {
            batch: "batch".to_string(),
            action: "action".to_string(),
            modifications: "modifications".to_string(),
        }
    }
}

/// Parser and renderer for the envelope.
#[derive(Debug, Clone, Default)]
pub struct ResponseProtocol {
    tags: ProtocolTags,
}

impl ResponseProtocol {
    pub fn new(tags: ProtocolTags) -> Self {
        Self { tags }
    }

    pub fn tags(&self) -> &ProtocolTags {
        &self.tags
    }

    /// The first batch in `text`.
    ///
    /// # Errors
    /// `MalformedBatch` when there is no batch container or it is invalid.
    pub fn parse_batch(&self, text: &str) -> Result<ActionBatch, ProtocolError> {
        let mut scanner = Scanner::new(text);
        let Some(start) = scanner.find_start_tag(&self.tags.batch) else {
            return Err(scanner.error(text.len(), format!("no <{}> element found", self.tags.batch)));
        };
        self.batch_at(&mut scanner, start)
    }

    /// Every batch in `text`, in document order.
    pub fn parse_batches(&self, text: &str) -> Result<Vec<ActionBatch>, ProtocolError> {
        let mut scanner = Scanner::new(text);
        let mut batches = Vec::new();
        while let Some(start) = scanner.find_start_tag(&self.tags.batch) {
            batches.push(self.batch_at(&mut scanner, start)?);
        }
        Ok(batches)
    }

    /// The modification preamble in `text`; empty when there is none.
    ///
    /// # Errors
    /// `MalformedBatch` for structural problems, `MalformedDiff` when a
    /// `<diff>` body is not a valid patch.
    pub fn parse_modifications(&self, text: &str) -> Result<Modifications, ProtocolError> {
        let mut scanner = Scanner::new(text);
        let Some(start) = scanner.find_start_tag(&self.tags.modifications) else {
            return Ok(Modifications::default());
        };
        let (_, self_closing) = scanner.attributes(start)?;
        let mut modifications = Modifications::default();
        if self_closing {
            return Ok(modifications);
        }

        loop {
            let (name, child_start) = match scanner.next_child(&self.tags.modifications, start)? {
                Child::End => break,
                Child::Open { name, start } => (name, start),
            };
            let is_diff = name.eq_ignore_ascii_case(DIFF_TAG);
            if !is_diff && !name.eq_ignore_ascii_case(FILE_TAG) {
                debug!(tag = name, "Skipping unknown modification element");
                scanner.skip_element(name);
                continue;
            }

            let (attrs, self_closing) = scanner.attributes(child_start)?;
            let Some(path) = attrs.get(PATH_ATTRS).map(str::to_string) else {
                return Err(scanner.error(child_start, format!("<{name}> is missing a path attribute")));
            };
            let body = if self_closing {
                ""
            } else {
                normalize_body(scanner.body(name, child_start)?)
            };

            let entry = if is_diff {
                let patch = parse_patch(body).map_err(|source| ProtocolError::MalformedDiff {
                    path: path.clone(),
                    source,
                })?;
                ModificationEntry::Diff { patch }
            } else {
                ModificationEntry::Full {
                    content: FileContent::from(body),
                }
            };
            modifications.push(Modification::new(path, entry));
        }
        Ok(modifications)
    }

    fn batch_at(&self, scanner: &mut Scanner<'_>, start: usize) -> Result<ActionBatch, ProtocolError> {
        let batch_tag = self.tags.batch.as_str();
        let (attrs, self_closing) = scanner.attributes(start)?;
        let Some(id) = attrs.get(&["id"]).filter(|id| !id.trim().is_empty()) else {
            return Err(scanner.error(start, format!("<{batch_tag}> is missing an id")));
        };
        let Some(title) = attrs.get(&["title"]) else {
            return Err(scanner.error(start, format!("<{batch_tag}> is missing a title")));
        };
        let mut batch = ActionBatch::new(id, title, Vec::new());
        if self_closing {
            return Ok(batch);
        }

        loop {
            let (name, child_start) = match scanner.next_child(batch_tag, start)? {
                Child::End => break,
                Child::Open { name, start } => (name, start),
            };
            if !name.eq_ignore_ascii_case(&self.tags.action) {
                debug!(tag = name, "Skipping unknown batch element");
                scanner.skip_element(name);
                continue;
            }
            batch.actions.push(self.action_at(scanner, name, child_start)?);
        }
        debug!(batch_id = %batch.id, actions = batch.len(), "Parsed batch");
        Ok(batch)
    }

    fn action_at(&self, scanner: &mut Scanner<'_>, name: &str, start: usize) -> Result<Action, ProtocolError> {
        let (attrs, self_closing) = scanner.attributes(start)?;
        let body = if self_closing { "" } else { scanner.body(name, start)? };
        let Some(kind) = attrs.get(KIND_ATTRS) else {
            return Err(scanner.error(start, format!("<{name}> is missing a kind attribute")));
        };
        let path = || {
            attrs
                .get(PATH_ATTRS)
                .map(str::to_string)
                .ok_or_else(|| scanner.error(start, format!("{kind} action is missing a path attribute")))
        };

        match kind {
            "file" => Ok(Action::File {
                path: path()?,
                content: FileContent::from(normalize_body(body)),
            }),
            "remove" => Ok(Action::Remove { path: path()? }),
            "command" | "shell" => {
                let command_line = body.trim();
                if command_line.is_empty() {
                    return Err(scanner.error(start, "command action has an empty body"));
                }
                Ok(Action::Command {
                    command_line: command_line.to_string(),
                })
            }
            other => Err(scanner.error(start, format!("unknown action kind `{other}`"))),
        }
    }
}

/// Drop one line break right after the opening tag and a whitespace-only
/// partial line right before the closing tag.
pub(crate) fn normalize_body(raw: &str) -> &str {
    let body = raw
        .strip_prefix("\r\n")
        .or_else(|| raw.strip_prefix('\n'))
        .unwrap_or(raw);
    let tail_start = body.rfind('\n').map_or(0, |i| i + 1);
    if body[tail_start..].chars().all(|c| c == ' ' || c == '\t') {
        &body[..tail_start]
    } else {
        body
    }
}
