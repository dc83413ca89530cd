use crate::action::{Action, ActionBatch, ModificationEntry, Modifications};
use crate::error::ProtocolError;
use crate::patch::serialize_patch;

use super::scanner::encode_entities;
use super::{normalize_body, ResponseProtocol, DIFF_TAG, FILE_TAG};

impl ResponseProtocol {
    /// Render a batch so that [`ResponseProtocol::parse_batch`] returns it
    /// unchanged.
    ///
    /// # Errors
    /// `Unrepresentable` when a body contains the action close tag or would
    /// lose bytes to body normalization.
    pub fn render_batch(&self, batch: &ActionBatch) -> Result<String, ProtocolError> {
        let batch_tag = &self.tags.batch;
        let action_tag = &self.tags.action;
        let mut out = format!(
            "<{batch_tag} id=\"{}\" title=\"{}\">\n",
            encode_entities(&batch.id),
            encode_entities(&batch.title)
        );
        for (index, action) in batch.actions.iter().enumerate() {
            match action {
                Action::File { path, content } => {
                    let body = embeddable(content.as_str(), action_tag, || format!("file `{path}`"))?;
                    out.push_str(&format!(
                        "<{action_tag} kind=\"file\" path=\"{}\">\n{body}</{action_tag}>\n",
                        encode_entities(path)
                    ));
                }
                Action::Remove { path } => {
                    out.push_str(&format!(
                        "<{action_tag} kind=\"remove\" path=\"{}\"/>\n",
                        encode_entities(path)
                    ));
                }
                Action::Command { command_line } => {
                    let command = command_line.trim();
                    if command.is_empty() || contains_close_tag(command, action_tag) {
                        return Err(ProtocolError::Unrepresentable {
                            target: format!("command #{index}"),
                            reason: format!("empty or contains `</{action_tag}>`"),
                        });
                    }
                    out.push_str(&format!(
                        "<{action_tag} kind=\"command\">\n{command}\n</{action_tag}>\n"
                    ));
                }
            }
        }
        out.push_str(&format!("</{batch_tag}>\n"));
        Ok(out)
    }

    /// Render a `<modifications>` preamble.
    ///
    /// # Errors
    /// `Unrepresentable` as for [`ResponseProtocol::render_batch`].
    pub fn render_modifications(&self, modifications: &Modifications) -> Result<String, ProtocolError> {
        let container = &self.tags.modifications;
        let mut out = format!("<{container}>\n");
        for modification in modifications {
            let path = encode_entities(&modification.path);
            match &modification.entry {
                ModificationEntry::Diff { patch } => {
                    let text = serialize_patch(patch);
                    let body = embeddable(&text, DIFF_TAG, || format!("diff for `{}`", modification.path))?;
                    out.push_str(&format!("<{DIFF_TAG} path=\"{path}\">\n{body}</{DIFF_TAG}>\n"));
                }
                ModificationEntry::Full { content } => {
                    let body = embeddable(content.as_str(), FILE_TAG, || format!("file `{}`", modification.path))?;
                    out.push_str(&format!("<{FILE_TAG} path=\"{path}\">\n{body}</{FILE_TAG}>\n"));
                }
            }
        }
        out.push_str(&format!("</{container}>\n"));
        Ok(out)
    }
}

fn contains_close_tag(body: &str, tag: &str) -> bool {
    body.to_ascii_lowercase()
        .contains(&format!("</{}", tag.to_ascii_lowercase()))
}

/// Return `body` if it survives a parse unchanged after a leading newline.
fn embeddable<'b>(body: &'b str, tag: &str, target: impl Fn() -> String) -> Result<&'b str, ProtocolError> {
    if contains_close_tag(body, tag) {
        return Err(ProtocolError::Unrepresentable {
            target: target(),
            reason: format!("contains `</{tag}>`"),
        });
    }
    let framed = format!("\n{body}");
    if normalize_body(&framed) != body {
        return Err(ProtocolError::Unrepresentable {
            target: target(),
            reason: "ends with a whitespace-only partial line".to_string(),
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Modification;
    use crate::patch::PatchCodec;

    #[test]
    fn batch_round_trips() {
        let protocol = ResponseProtocol::default();
        let batch = ActionBatch::new(
            "id-\"1\"",
            "Fix <things> & stuff",
            vec![
                Action::file("src/a.rs", "fn main() {}\n"),
                Action::file("empty.txt", ""),
                Action::file("no-newline.txt", "tail"),
                Action::file("leading.txt", "\n\nspaced\n"),
                Action::command("cargo test"),
                Action::remove("old.rs"),
            ],
        );
        let text = protocol.render_batch(&batch).unwrap();
        assert_eq!(protocol.parse_batch(&text).unwrap(), batch);
    }

    #[test]
    fn refuses_embedded_close_tag() {
        let protocol = ResponseProtocol::default();
        let batch = ActionBatch::new("x", "t", vec![Action::file("a.html", "<p></action></p>\n")]);
        assert!(matches!(
            protocol.render_batch(&batch),
            Err(ProtocolError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn refuses_trailing_whitespace_partial_line() {
        let protocol = ResponseProtocol::default();
        let batch = ActionBatch::new("x", "t", vec![Action::file("a.txt", "line\n   ")]);
        assert!(protocol.render_batch(&batch).is_err());
    }

    #[test]
    fn modifications_round_trip() {
        let protocol = ResponseProtocol::default();
        let codec = PatchCodec::default();
        let patch = codec.diff(&"a\nb\nc\n".into(), &"a\nB\nc\nd\n".into());
        let mods: Modifications = vec![
            Modification::new("a.txt", ModificationEntry::Diff { patch }),
            Modification::new("b.txt", ModificationEntry::Full { content: "full\n".into() }),
        ]
        .into_iter()
        .collect();
        let text = protocol.render_modifications(&mods).unwrap();
        assert!(text.contains("<diff path=\"a.txt\">\n@@ -1,3 +1,4 @@\n a\n-b\n+B\n c\n+d\n</diff>"));
        assert_eq!(protocol.parse_modifications(&text).unwrap(), mods);
    }
}
