//! Choose the cheaper wire form for a file edit.

use crate::action::ModificationEntry;
use crate::content::FileContent;
use crate::patch::PatchCodec;

/// Pure selector between a serialized diff and the verbatim new content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeSelector {
    codec: PatchCodec,
}

impl ChangeSelector {
    pub fn new(codec: PatchCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &PatchCodec {
        &self.codec
    }

    /// `Full` when there is no prior content. Otherwise `Diff` only if the
    /// serialized patch is strictly shorter (in bytes) than `new`; ties go to
    /// `Full`.
    pub fn select(&self, old: Option<&FileContent>, new: &FileContent) -> ModificationEntry {
        let Some(old) = old else {
            return ModificationEntry::Full {
                content: new.clone(),
            };
        };
        let patch = self.codec.diff(old, new);
        let patch_len = self.codec.serialize(&patch).len();
        if patch_len < new.len() {
            ModificationEntry::Diff { patch }
        } else {
            ModificationEntry::Full {
                content: new.clone(),
            }
        }
    }
}
