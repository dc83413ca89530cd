//! Textual hunk format.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::PatchError;

use super::{Hunk, HunkLine, LineKind, Patch};

/// Marker line following a body line that has no terminator.
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("HUNK_HEADER regex should compile")
});

/// Render hunks with explicit counts: `@@ -S,C +S,C @@`.
pub fn serialize_patch(patch: &Patch) -> String {
    let mut out = String::new();
    for hunk in patch.hunks() {
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            hunk.original_start, hunk.original_count, hunk.modified_start, hunk.modified_count
        ));
        for line in &hunk.lines {
            out.push(line.kind.marker());
            out.push_str(&line.text);
            if !line.text.ends_with('\n') {
                out.push('\n');
                out.push_str(NO_NEWLINE_MARKER);
                out.push('\n');
            }
        }
    }
    out
}

struct OpenHunk {
    header_line: usize,
    hunk: Hunk,
    original_left: usize,
    modified_left: usize,
}

impl OpenHunk {
    fn complete(&self) -> bool {
        self.original_left == 0 && self.modified_left == 0
    }

    fn finish(self) -> Result<Hunk, PatchError> {
        if !self.complete() {
            return Err(PatchError::malformed(
                self.header_line,
                format!(
                    "hunk body is shorter than its header -{},{} +{},{}",
                    self.hunk.original_start,
                    self.hunk.original_count,
                    self.hunk.modified_start,
                    self.hunk.modified_count
                ),
            ));
        }
        Ok(self.hunk)
    }
}

/// Parse hunk text.
///
/// Accepted leniencies: `@@ -S +S @@` means a count of 1, text after the
/// closing `@@` is ignored, a completely empty body line is empty context,
/// blank lines between hunks are skipped, and `---`/`+++` file headers are
/// skipped before the first hunk.
pub fn parse_patch(text: &str) -> Result<Patch, PatchError> {
    let mut hunks = Vec::new();
    let mut open: Option<OpenHunk> = None;

    for (idx, raw) in text.split_inclusive('\n').enumerate() {
        let lineno = idx + 1;

        if raw.starts_with("@@") {
            if let Some(prev) = open.take() {
                hunks.push(prev.finish()?);
            }
            open = Some(parse_header(raw, lineno)?);
            continue;
        }

        let Some(current) = open.as_mut() else {
            let trimmed = raw.trim_end();
            if trimmed.is_empty()
                || (hunks.is_empty() && (trimmed.starts_with("--- ") || trimmed.starts_with("+++ ")))
            {
                continue;
            }
            return Err(PatchError::malformed(lineno, "expected a hunk header"));
        };

        if let Some(marker_rest) = raw.strip_prefix('\\') {
            if !marker_rest.trim_start().starts_with("No newline") {
                return Err(PatchError::malformed(lineno, "unrecognized `\\` marker line"));
            }
            let Some(last) = current.hunk.lines.last_mut() else {
                return Err(PatchError::malformed(lineno, "no-newline marker without a preceding line"));
            };
            if !last.text.ends_with('\n') {
                return Err(PatchError::malformed(lineno, "no-newline marker applied twice"));
            }
            last.text.pop();
            continue;
        }

        let (kind, body) = match raw.chars().next() {
            Some(' ') => (LineKind::Context, &raw[1..]),
            Some('-') => (LineKind::Removed, &raw[1..]),
            Some('+') => (LineKind::Added, &raw[1..]),
            Some('\n') | Some('\r') if raw.trim_end_matches(['\r', '\n']).is_empty() => {
                if current.complete() {
                    continue;
                }
                (LineKind::Context, raw)
            }
            Some(other) => {
                return Err(PatchError::malformed(
                    lineno,
                    format!("unrecognized line marker {other:?}"),
                ))
            }
            None => continue,
        };

        let overflow = (kind.in_original() && current.original_left == 0)
            || (kind.in_modified() && current.modified_left == 0);
        if overflow {
            return Err(PatchError::malformed(
                lineno,
                format!(
                    "hunk body is longer than its header -{},{} +{},{}",
                    current.hunk.original_start,
                    current.hunk.original_count,
                    current.hunk.modified_start,
                    current.hunk.modified_count
                ),
            ));
        }
        if kind.in_original() {
            current.original_left -= 1;
        }
        if kind.in_modified() {
            current.modified_left -= 1;
        }

        // A body line cut off by the end of the text is still a whole line.
        let mut line_text = body.to_string();
        if !line_text.ends_with('\n') {
            line_text.push('\n');
        }
        current.hunk.lines.push(HunkLine::new(kind, line_text));
    }

    if let Some(last) = open.take() {
        hunks.push(last.finish()?);
    }
    Ok(Patch::new(hunks))
}

fn parse_header(raw: &str, lineno: usize) -> Result<OpenHunk, PatchError> {
    let caps = HUNK_HEADER
        .captures(raw)
        .ok_or_else(|| PatchError::malformed(lineno, format!("invalid hunk header {:?}", raw.trim_end())))?;

    let number = |i: usize, default: usize| -> Result<usize, PatchError> {
        match caps.get(i) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| PatchError::malformed(lineno, format!("number out of range: {}", m.as_str()))),
            None => Ok(default),
        }
    };

    let original_start = number(1, 0)?;
    let original_count = number(2, 1)?;
    let modified_start = number(3, 0)?;
    let modified_count = number(4, 1)?;

    if (original_count > 0 && original_start == 0) || (modified_count > 0 && modified_start == 0) {
        return Err(PatchError::malformed(lineno, "non-empty span cannot start at line 0"));
    }

    Ok(OpenHunk {
        header_line: lineno,
        hunk: Hunk {
            original_start,
            original_count,
            modified_start,
            modified_count,
            lines: Vec::new(),
        },
        original_left: original_count,
        modified_left: modified_count,
    })
}
