use crate::content::FileContent;
use crate::error::PatchError;

use super::{LineKind, Patch};

/// Replay `patch` against `old`, verifying every context and removed line
/// byte for byte. No fuzz, no offset search.
pub fn apply_patch(old: &FileContent, patch: &Patch) -> Result<FileContent, PatchError> {
    let lines = old.lines();
    let mut out = String::with_capacity(old.len());
    let mut cursor = 0usize;

    for (i, hunk) in patch.hunks().iter().enumerate() {
        let number = i + 1;
        if !hunk.counts_match() {
            return Err(PatchError::malformed(
                0,
                format!(
                    "hunk {number} body does not match its header -{},{} +{},{}",
                    hunk.original_start,
                    hunk.original_count,
                    hunk.modified_start,
                    hunk.modified_count
                ),
            ));
        }
        if hunk.original_count > 0 && hunk.original_start == 0 {
            return Err(PatchError::malformed(
                0,
                format!("hunk {number} has a non-empty span starting at line 0"),
            ));
        }

        let start = hunk.original_index();
        if start < cursor {
            return Err(PatchError::conflict(
                number,
                hunk.original_start,
                "hunk overlaps or precedes the previous hunk",
            ));
        }
        if start + hunk.original_count > lines.len() {
            return Err(PatchError::conflict(
                number,
                hunk.original_start,
                format!(
                    "span of {} lines extends past end of file ({} lines)",
                    hunk.original_count,
                    lines.len()
                ),
            ));
        }

        for line in &lines[cursor..start] {
            out.push_str(line);
        }

        let mut pos = start;
        for line in &hunk.lines {
            match line.kind {
                LineKind::Context | LineKind::Removed => {
                    if lines[pos] != line.text {
                        return Err(PatchError::conflict(
                            number,
                            pos + 1,
                            format!("expected {:?}, found {:?}", line.text, lines[pos]),
                        ));
                    }
                    if line.kind == LineKind::Context {
                        out.push_str(&line.text);
                    }
                    pos += 1;
                }
                LineKind::Added => out.push_str(&line.text),
            }
        }
        cursor = pos;
    }

    for line in &lines[cursor..] {
        out.push_str(line);
    }
    Ok(FileContent::new(out))
}
