//! Randomized checks of the patch codec and change selector laws.
//!
//! - apply(old, diff(old, new)) == new, also through the text format
//! - a patch applied to a base whose touched span changed is a conflict
//! - the selector picks the strictly shorter representation, ties go full
//! - among minimal alignments the earliest original lines are kept

use std::time::{Duration, Instant};

use changeset::{ChangeSelector, FileContent, LineKind, ModificationEntry, Patch, PatchCodec};
use proptest::prelude::*;

/// Content built from a small alphabet so diffs have plenty of matches, with
/// an optional unterminated last line.
fn content() -> impl Strategy<Value = FileContent> {
    let line = prop::sample::select(vec!["a\n", "b\n", "c\n", "\n", "fn main() {}\n", "x\r\n"]);
    (
        prop::collection::vec(line, 0..40),
        prop::option::of(prop::sample::select(vec!["tail", "a", " "])),
    )
        .prop_map(|(lines, tail)| {
            let mut text: String = lines.concat();
            if let Some(tail) = tail {
                text.push_str(tail);
            }
            FileContent::new(text)
        })
}

// ── Property: round trip ───────────────────────────────────────────

proptest! {
    #[test]
    fn prop_apply_diff_reproduces_new(old in content(), new in content(), context in 0..5usize) {
        let codec = PatchCodec::new(context);
        let patch = codec.diff(&old, &new);
        prop_assert_eq!(codec.apply(&old, &patch).unwrap(), new.clone());

        let reparsed = codec.parse(&codec.serialize(&patch)).unwrap();
        prop_assert_eq!(&reparsed, &patch);
        prop_assert_eq!(codec.apply(&old, &reparsed).unwrap(), new);
    }

    #[test]
    fn prop_hunks_are_ordered_and_consistent(old in content(), new in content()) {
        let patch = PatchCodec::default().diff(&old, &new);
        let mut previous_end = 0usize;
        for hunk in patch.hunks() {
            prop_assert!(hunk.counts_match());
            prop_assert!(hunk.original_index() >= previous_end);
            previous_end = hunk.original_index() + hunk.original_count;
        }
    }

    #[test]
    fn prop_diff_is_deterministic(old in content(), new in content()) {
        let codec = PatchCodec::default();
        prop_assert_eq!(codec.diff(&old, &new), codec.diff(&old, &new));
    }
}

// ── Property: earliest alignment ───────────────────────────────────

/// Original line indices the patch leaves in place.
fn kept_original_lines(patch: &Patch, old_len: usize) -> Vec<usize> {
    let mut removed = Vec::new();
    for hunk in patch.hunks() {
        let mut index = hunk.original_index();
        for line in &hunk.lines {
            match line.kind {
                LineKind::Context => index += 1,
                LineKind::Removed => {
                    removed.push(index);
                    index += 1;
                }
                LineKind::Added => {}
            }
        }
    }
    (0..old_len).filter(|i| !removed.contains(i)).collect()
}

fn is_subsequence<'a>(mut picked: impl Iterator<Item = &'a str>, new: &[&str]) -> bool {
    let mut next = picked.next();
    for line in new {
        if next == Some(*line) {
            next = picked.next();
        }
    }
    next.is_none()
}

/// Index sets of `size` out of `0..n`, in lexicographic order.
fn combinations(n: usize, size: usize) -> Vec<Vec<usize>> {
    if size == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for first in 0..n {
        for rest in combinations(n, size - 1) {
            if rest.first().map_or(true, |&r| r > first) {
                let mut picked = vec![first];
                picked.extend(rest);
                out.push(picked);
            }
        }
    }
    out
}

/// Lexicographically smallest longest common subsequence by original index,
/// found by exhaustive search.
fn earliest_common_lines(old: &[&str], new: &[&str]) -> Vec<usize> {
    (0..=old.len().min(new.len()))
        .rev()
        .find_map(|size| {
            combinations(old.len(), size)
                .into_iter()
                .find(|picked| is_subsequence(picked.iter().map(|&i| old[i]), new))
        })
        .unwrap_or_default()
}

fn two_letter_lines() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(vec!["a\n", "b\n"]), 0..7)
}

proptest! {
    #[test]
    fn prop_diff_keeps_earliest_original_lines(old in two_letter_lines(), new in two_letter_lines(), context in 0..3usize) {
        let patch = PatchCodec::new(context).diff(
            &FileContent::new(old.concat()),
            &FileContent::new(new.concat()),
        );
        prop_assert_eq!(kept_original_lines(&patch, old.len()), earliest_common_lines(&old, &new));
    }
}

// ── Property: conflict detection ───────────────────────────────────

proptest! {
    #[test]
    fn prop_changed_base_conflicts(old in content(), new in content()) {
        let codec = PatchCodec::default();
        let patch = codec.diff(&old, &new);
        prop_assume!(!patch.is_empty());
        let hunk = &patch.hunks()[0];
        prop_assume!(hunk.original_count > 0);

        let mut lines: Vec<String> = old.lines().into_iter().map(str::to_string).collect();
        let target = hunk.original_index();
        lines[target] = if lines[target].ends_with('\n') {
            "CONFLICT\n".to_string()
        } else {
            "CONFLICT".to_string()
        };
        let other_base = FileContent::new(lines.concat());

        let err = codec.apply(&other_base, &patch).unwrap_err();
        prop_assert!(err.is_conflict());
    }
}

// ── Property: selector boundary ────────────────────────────────────

proptest! {
    #[test]
    fn prop_selector_picks_strictly_shorter(old in content(), new in content()) {
        let selector = ChangeSelector::default();
        let codec = selector.codec();
        let serialized_len = codec.serialize(&codec.diff(&old, &new)).len();

        match selector.select(Some(&old), &new) {
            ModificationEntry::Diff { patch } => {
                prop_assert!(serialized_len < new.len());
                prop_assert_eq!(codec.apply(&old, &patch).unwrap(), new);
            }
            ModificationEntry::Full { content } => {
                prop_assert!(serialized_len >= new.len());
                prop_assert_eq!(content, new);
            }
        }
    }

    #[test]
    fn prop_selector_without_base_is_full(new in content()) {
        let entry = ChangeSelector::default().select(None, &new);
        prop_assert_eq!(entry, ModificationEntry::Full { content: new });
    }
}

// ── Fixed scenarios ────────────────────────────────────────────────

#[test]
fn swapped_lines_keep_the_first_original() {
    let patch = PatchCodec::default().diff(&FileContent::from("b\na\n"), &FileContent::from("a\nb\n"));
    assert_eq!(patch.to_string(), "@@ -1,2 +1,2 @@\n+a\n b\n-a\n");
}

#[test]
fn full_rewrite_of_a_large_file_is_bounded() {
    let old: String = (0..8000).map(|i| format!("old line {i}\n")).collect();
    let new: String = (0..8000).map(|i| format!("new line {i}\n")).collect();
    let (old, new) = (FileContent::new(old), FileContent::new(new));
    let codec = PatchCodec::default();

    let started = Instant::now();
    let patch = codec.diff(&old, &new);
    assert!(started.elapsed() < Duration::from_secs(30));

    assert_eq!(patch.len(), 1);
    assert_eq!(patch.changed_lines(), 16_000);
    assert_eq!(codec.apply(&old, &patch).unwrap(), new);
    let entry = ChangeSelector::default().select(Some(&old), &new);
    assert!(matches!(entry, ModificationEntry::Full { .. }));
}

#[test]
fn single_line_edit_in_a_large_file() {
    let old: String = (0..6000).map(|i| format!("line {i}\n")).collect();
    let new = old.replace("line 3000\n", "line three thousand\n");
    let (old, new) = (FileContent::new(old), FileContent::new(new));
    let codec = PatchCodec::default();

    let patch = codec.diff(&old, &new);

    assert_eq!(patch.len(), 1);
    assert!(codec.serialize(&patch).starts_with("@@ -2998,7 +2998,7 @@\n"));
    assert_eq!(patch.changed_lines(), 2);
    assert_eq!(codec.apply(&old, &patch).unwrap(), new);
}

#[test]
fn concrete_scenario() {
    let codec = PatchCodec::default();
    let old = FileContent::from("a\nb\nc\n");
    let new = FileContent::from("a\nB\nc\nd\n");
    let text = codec.serialize(&codec.diff(&old, &new));
    assert_eq!(text, "@@ -1,3 +1,4 @@\n a\n-b\n+B\n c\n+d\n");
    let parsed = codec.parse(&text).unwrap();
    assert_eq!(codec.apply(&old, &parsed).unwrap(), new);
}

#[test]
fn parser_rejects_overlong_hunk_body() {
    let err = PatchCodec::default()
        .parse("@@ -1,1 +1,2 @@\n a\n+b\n+c\n")
        .unwrap_err();
    assert!(matches!(err, changeset::error::PatchError::MalformedPatch { .. }));
}
