//! Minimal line alignment and hunk grouping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use similar::{Algorithm, DiffTag};

use super::{Hunk, HunkLine, LineKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal { old: usize, new: usize },
    Delete { old: usize },
    Insert { new: usize },
}

impl Edit {
    fn is_change(self) -> bool {
        !matches!(self, Self::Equal { .. })
    }

    fn shifted(self, by: usize) -> Self {
        match self {
            Self::Equal { old, new } => Self::Equal { old: old + by, new: new + by },
            Self::Delete { old } => Self::Delete { old: old + by },
            Self::Insert { new } => Self::Insert { new: new + by },
        }
    }
}

/// Group a minimal edit script between `old` and `new` into hunks with
/// `context` unchanged lines on each side. Hunks whose context windows would
/// touch or overlap are merged.
pub fn diff_lines(old: &[&str], new: &[&str], context: usize) -> Vec<Hunk> {
    let edits = deletions_first(align(old, new));
    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, edit)| edit.is_change())
        .map(|(idx, _)| idx)
        .collect();
    let Some(&first_change) = changes.first() else {
        return Vec::new();
    };

    // (old_before, new_before) line counts preceding each edit.
    let mut positions = Vec::with_capacity(edits.len());
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for edit in &edits {
        positions.push((old_pos, new_pos));
        match edit {
            Edit::Equal { .. } => {
                old_pos += 1;
                new_pos += 1;
            }
            Edit::Delete { .. } => old_pos += 1,
            Edit::Insert { .. } => new_pos += 1,
        }
    }

    let mut groups = Vec::new();
    let (mut group_start, mut group_end) = (first_change, first_change);
    for &idx in &changes[1..] {
        let unchanged_between = idx - group_end - 1;
        if unchanged_between > 2 * context {
            groups.push((group_start, group_end));
            group_start = idx;
        }
        group_end = idx;
    }
    groups.push((group_start, group_end));

    groups
        .into_iter()
        .map(|(first, last)| {
            let lo = first.saturating_sub(context);
            let hi = (last + context).min(edits.len() - 1);
            build_hunk(&edits[lo..=hi], positions[lo], old, new)
        })
        .collect()
}

fn build_hunk(edits: &[Edit], (old_before, new_before): (usize, usize), old: &[&str], new: &[&str]) -> Hunk {
    let lines: Vec<HunkLine> = edits
        .iter()
        .map(|edit| match *edit {
            Edit::Equal { old: o, .. } => HunkLine::new(LineKind::Context, old[o]),
            Edit::Delete { old: o } => HunkLine::new(LineKind::Removed, old[o]),
            Edit::Insert { new: n } => HunkLine::new(LineKind::Added, new[n]),
        })
        .collect();
    let original_count = lines.iter().filter(|l| l.kind.in_original()).count();
    let modified_count = lines.iter().filter(|l| l.kind.in_modified()).count();
    Hunk {
        original_start: span_start(old_before, original_count),
        original_count,
        modified_start: span_start(new_before, modified_count),
        modified_count,
        lines,
    }
}

fn span_start(lines_before: usize, count: usize) -> usize {
    if count == 0 {
        lines_before
    } else {
        lines_before + 1
    }
}

/// Within each run of consecutive changes, emit removals before additions.
fn deletions_first(edits: Vec<Edit>) -> Vec<Edit> {
    let mut out = Vec::with_capacity(edits.len());
    let mut inserts = Vec::new();
    for edit in edits {
        match edit {
            Edit::Insert { .. } => inserts.push(edit),
            Edit::Delete { .. } => out.push(edit),
            Edit::Equal { .. } => {
                out.append(&mut inserts);
                out.push(edit);
            }
        }
    }
    out.append(&mut inserts);
    out
}

/// Line-pair budget for the exact alignment table. Beyond it the
/// linear-space search takes over.
const EXACT_CELLS: usize = 1 << 22;

/// How long the linear-space search may refine before settling for a
/// correct but non-minimal script.
const SEARCH_DEADLINE: Duration = Duration::from_secs(2);

/// Minimal edit script from `old` to `new`. Among equally short scripts the
/// one whose matched original lines come earliest (lexicographically) wins.
/// That holds exactly while the unshared middle fits [`EXACT_CELLS`]; past it
/// the Myers script from `similar` is used with each deletion run slid onto
/// the earliest equal line it can take over.
fn align(old: &[&str], new: &[&str]) -> Vec<Edit> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let (old_rest, new_rest) = (&old[prefix..], &new[prefix..]);

    let rest = if old_rest.len().saturating_mul(new_rest.len()) <= EXACT_CELLS {
        earliest_alignment(old_rest, new_rest)
    } else {
        slide_deletions(myers_alignment(old_rest, new_rest), old_rest)
    };

    let mut edits = Vec::with_capacity(prefix + rest.len());
    edits.extend((0..prefix).map(|i| Edit::Equal { old: i, new: i }));
    edits.extend(rest.into_iter().map(|edit| edit.shifted(prefix)));
    edits
}

/// Exact longest common subsequence with the earliest-original tie-break.
///
/// `lcs[i][j]` is the common length of `old[i..]` and `new[j..]`. Walking
/// forward, the next match is the smallest original index that still opens
/// an optimal remainder, paired with its first occurrence in `new`.
fn earliest_alignment(old: &[&str], new: &[&str]) -> Vec<Edit> {
    let (n, m) = (old.len(), new.len());
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if old[i] == new[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut occurrences: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, &line) in new.iter().enumerate() {
        occurrences.entry(line).or_default().push(j);
    }
    let first_from = |line: &str, from: usize| {
        let positions = occurrences.get(line)?;
        positions.get(positions.partition_point(|&j| j < from)).copied()
    };

    let mut edits = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    let mut remaining = lcs[0];
    while remaining > 0 {
        let next = (i..n).find_map(|o| {
            let nj = first_from(old[o], j)?;
            (lcs[(o + 1) * width + nj + 1] + 1 == remaining).then_some((o, nj))
        });
        let Some((o, nj)) = next else { break };
        edits.extend((i..o).map(|old| Edit::Delete { old }));
        edits.extend((j..nj).map(|new| Edit::Insert { new }));
        edits.push(Edit::Equal { old: o, new: nj });
        (i, j) = (o + 1, nj + 1);
        remaining -= 1;
    }
    edits.extend((i..n).map(|old| Edit::Delete { old }));
    edits.extend((j..m).map(|new| Edit::Insert { new }));
    edits
}

fn myers_alignment(old: &[&str], new: &[&str]) -> Vec<Edit> {
    let deadline = Instant::now() + SEARCH_DEADLINE;
    let ops = similar::capture_diff_slices_deadline(Algorithm::Myers, old, new, Some(deadline));

    let mut edits = Vec::with_capacity(old.len().max(new.len()));
    for op in ops {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            edits.extend(old_range.zip(new_range).map(|(old, new)| Edit::Equal { old, new }));
        } else {
            edits.extend(old_range.map(|old| Edit::Delete { old }));
            edits.extend(new_range.map(|new| Edit::Insert { new }));
        }
    }
    edits
}

/// Slide every deletion run `old[a..b]` followed by `Equal(b, d)` onto
/// `Equal(a, d)` while `old[a] == old[b]`. The script keeps its length and
/// its matched original indices only move earlier.
fn slide_deletions(edits: Vec<Edit>, old: &[&str]) -> Vec<Edit> {
    let mut out = Vec::with_capacity(edits.len());
    // First original index of the pending deletion run; the run ends right
    // before the next equal line, or at the end of `old`.
    let mut run_start: Option<usize> = None;
    for edit in edits {
        match edit {
            Edit::Delete { old: o } => {
                run_start.get_or_insert(o);
            }
            Edit::Insert { .. } => out.push(edit),
            Edit::Equal { old: b, new: d } => match run_start {
                Some(a) if old[a] == old[b] => {
                    out.push(Edit::Equal { old: a, new: d });
                    run_start = Some(a + 1);
                }
                Some(a) => {
                    out.extend((a..b).map(|old| Edit::Delete { old }));
                    out.push(edit);
                    run_start = None;
                }
                None => out.push(edit),
            },
        }
    }
    if let Some(a) = run_start {
        out.extend((a..old.len()).map(|old| Edit::Delete { old }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(old: &[&str], new: &[&str]) -> Vec<Edit> {
        deletions_first(align(old, new))
    }

    #[test]
    fn empty_inputs() {
        assert!(align(&[], &[]).is_empty());
        assert!(diff_lines(&[], &[], 3).is_empty());
    }

    #[test]
    fn pure_insertion_into_empty_file() {
        let hunks = diff_lines(&[], &["a\n", "b\n"], 3);
        assert_eq!(hunks.len(), 1);
        let hunk = &hunks[0];
        assert_eq!((hunk.original_start, hunk.original_count), (0, 0));
        assert_eq!((hunk.modified_start, hunk.modified_count), (1, 2));
    }

    #[test]
    fn pure_deletion_to_empty_file() {
        let hunks = diff_lines(&["a\n"], &[], 3);
        let hunk = &hunks[0];
        assert_eq!((hunk.original_start, hunk.original_count), (1, 1));
        assert_eq!((hunk.modified_start, hunk.modified_count), (0, 0));
    }

    #[test]
    fn script_is_minimal() {
        let old = ["a\n", "b\n", "c\n", "a\n", "b\n", "b\n", "a\n"];
        let new = ["c\n", "b\n", "a\n", "b\n", "a\n", "c\n"];
        let changes = script(&old, &new).iter().filter(|e| e.is_change()).count();
        // Classic Myers example: edit distance 5.
        assert_eq!(changes, 5);
    }

    #[test]
    fn duplicate_lines_match_earliest_original() {
        let edits = script(&["x\n", "x\n"], &["x\n"]);
        assert_eq!(
            edits,
            vec![Edit::Equal { old: 0, new: 0 }, Edit::Delete { old: 1 }]
        );
    }

    #[test]
    fn swapped_pair_keeps_the_first_original_line() {
        let edits = script(&["b\n", "a\n"], &["a\n", "b\n"]);
        assert_eq!(
            edits,
            vec![
                Edit::Insert { new: 0 },
                Edit::Equal { old: 0, new: 1 },
                Edit::Delete { old: 1 },
            ]
        );
    }

    #[test]
    fn earliest_match_past_a_shared_suffix() {
        // Matching the shared last line would keep old[1]; old[0] is earlier.
        let edits = script(&["a\n", "a\n"], &["b\n", "a\n"]);
        assert_eq!(
            edits,
            vec![
                Edit::Insert { new: 0 },
                Edit::Equal { old: 0, new: 1 },
                Edit::Delete { old: 1 },
            ]
        );
    }

    #[test]
    fn deletion_runs_slide_onto_earlier_equal_lines() {
        let old = ["x\n", "x\n", "x\n", "y\n"];
        let myers = vec![
            Edit::Delete { old: 0 },
            Edit::Delete { old: 1 },
            Edit::Equal { old: 2, new: 0 },
            Edit::Equal { old: 3, new: 1 },
        ];
        assert_eq!(
            slide_deletions(myers, &old),
            vec![
                Edit::Equal { old: 0, new: 0 },
                Edit::Delete { old: 1 },
                Edit::Delete { old: 2 },
                Edit::Equal { old: 3, new: 1 },
            ]
        );
    }

    #[test]
    fn linear_search_script_replays_to_new() {
        let old: Vec<String> = (0..300).map(|i| format!("old {}\n", i % 7)).collect();
        let new: Vec<String> = (0..300).map(|i| format!("old {}\n", i % 5)).collect();
        let old: Vec<&str> = old.iter().map(String::as_str).collect();
        let new: Vec<&str> = new.iter().map(String::as_str).collect();

        let edits = slide_deletions(myers_alignment(&old, &new), &old);
        let mut replayed = Vec::new();
        let mut consumed = 0;
        for edit in &edits {
            match *edit {
                Edit::Equal { old: o, new: n } => {
                    assert_eq!(old[o], new[n]);
                    assert_eq!(o, consumed);
                    consumed += 1;
                    replayed.push(new[n]);
                }
                Edit::Delete { old: o } => {
                    assert_eq!(o, consumed);
                    consumed += 1;
                }
                Edit::Insert { new: n } => replayed.push(new[n]),
            }
        }
        assert_eq!(consumed, old.len());
        assert_eq!(replayed, new);
    }

    #[test]
    fn removals_precede_additions_in_a_change_run() {
        let edits = script(&["a\n", "b\n", "c\n"], &["a\n", "x\n", "y\n", "c\n"]);
        assert_eq!(
            edits,
            vec![
                Edit::Equal { old: 0, new: 0 },
                Edit::Delete { old: 1 },
                Edit::Insert { new: 1 },
                Edit::Insert { new: 2 },
                Edit::Equal { old: 2, new: 3 },
            ]
        );
    }

    #[test]
    fn terminator_difference_is_a_change() {
        let hunks = diff_lines(&["a\n", "b"], &["a\n", "b\n"], 3);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].changed_lines(), 2);
    }
}
