//! Unified line diff
//!
//! Longest-common-subsequence over lines after trimming the shared prefix
//! and suffix. Inputs whose changed middle is too large for the LCS table
//! are rendered as a single replacement hunk.

use std::fmt::Write as _;

const CONTEXT: usize = 3;
const MAX_TABLE_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op<'a> {
    Keep(&'a str),
    Remove(&'a str),
    Add(&'a str),
}

/// Added / removed line counts of a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Lines added
    pub added: usize,
    /// Lines removed
    pub removed: usize,
}

impl DiffStats {
    /// Count `+`/`-` lines of a unified diff, ignoring file headers
    #[must_use]
    pub fn from_unified(diff: &str) -> Self {
        let mut stats = Self::default();
        for line in diff.lines() {
            if line.starts_with("+++") || line.starts_with("---") {
                continue;
            }
            if line.starts_with('+') {
                stats.added += 1;
            } else if line.starts_with('-') {
                stats.removed += 1;
            }
        }
        stats
    }
}

fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Op<'a>> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops: Vec<Op<'a>> = old[..prefix].iter().map(|l| Op::Keep(l)).collect();

    if (old_mid.len() + 1) * (new_mid.len() + 1) > MAX_TABLE_CELLS {
        ops.extend(old_mid.iter().map(|l| Op::Remove(l)));
        ops.extend(new_mid.iter().map(|l| Op::Add(l)));
    } else {
        ops.extend(lcs_ops(old_mid, new_mid));
    }

    ops.extend(old[old.len() - suffix..].iter().map(|l| Op::Keep(l)));
    ops
}

fn lcs_ops<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Op<'a>> {
    let (n, m) = (old.len(), new.len());
    let width = m + 1;
    // table[i][j] = LCS length of old[i..] and new[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Keep(old[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op::Remove(old[i]));
            i += 1;
        } else {
            ops.push(Op::Add(new[j]));
            j += 1;
        }
    }
    ops.extend(old[i..].iter().map(|l| Op::Remove(l)));
    ops.extend(new[j..].iter().map(|l| Op::Add(l)));
    ops
}

/// Render a unified diff with three lines of context
///
/// Returns an empty string when the inputs are identical.
#[must_use]
pub fn unified_diff(old: &str, new: &str, old_path: &str, new_path: &str) -> String {
    if old == new {
        return String::new();
    }
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = edit_script(&old_lines, &new_lines);

    let changed: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, Op::Keep(_)))
        .map(|(i, _)| i)
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "--- a/{old_path}");
    let _ = writeln!(out, "+++ b/{new_path}");

    if changed.is_empty() {
        // Only line endings differ
        let _ = writeln!(out, "@@ -1,{} +1,{} @@", old_lines.len(), new_lines.len());
        let _ = writeln!(out, "\\ line endings changed");
        return out;
    }

    // Group changes whose context windows touch
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for &idx in &changed {
        let start = idx.saturating_sub(CONTEXT);
        let end = (idx + CONTEXT + 1).min(ops.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => hunks.push((start, end)),
        }
    }

    // Line numbers at the start of every op
    let mut old_no = Vec::with_capacity(ops.len() + 1);
    let mut new_no = Vec::with_capacity(ops.len() + 1);
    let (mut o, mut n) = (1usize, 1usize);
    for op in &ops {
        old_no.push(o);
        new_no.push(n);
        match op {
            Op::Keep(_) => {
                o += 1;
                n += 1;
            }
            Op::Remove(_) => o += 1,
            Op::Add(_) => n += 1,
        }
    }

    for (start, end) in hunks {
        let slice = &ops[start..end];
        let old_len = slice.iter().filter(|op| !matches!(op, Op::Add(_))).count();
        let new_len = slice.iter().filter(|op| !matches!(op, Op::Remove(_))).count();
        let old_start = if old_len == 0 { old_no[start] - 1 } else { old_no[start] };
        let new_start = if new_len == 0 { new_no[start] - 1 } else { new_no[start] };
        let _ = writeln!(out, "@@ -{old_start},{old_len} +{new_start},{new_len} @@");
        for op in slice {
            let _ = match op {
                Op::Keep(l) => writeln!(out, " {l}"),
                Op::Remove(l) => writeln!(out, "-{l}"),
                Op::Add(l) => writeln!(out, "+{l}"),
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_inputs_produce_no_diff() {
        assert_eq!(unified_diff("a\nb\n", "a\nb\n", "x", "x"), "");
    }

    #[test]
    fn single_line_change() {
        let old = "one\ntwo\nthree\nfour\nfive\nsix\nseven\neight\n";
        let new = "one\ntwo\nthree\nfour\nFIVE\nsix\nseven\neight\n";
        let diff = unified_diff(old, new, "a.js", "a.js");
        assert_eq!(
            diff,
            "--- a/a.js\n+++ b/a.js\n@@ -2,7 +2,7 @@\n two\n three\n four\n-five\n+FIVE\n six\n seven\n eight\n"
        );
        assert_eq!(DiffStats::from_unified(&diff), DiffStats { added: 1, removed: 1 });
    }

    #[test]
    fn separate_hunks_for_distant_changes() {
        let old: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let new = old.replace("line 2\n", "line two\n").replace("line 25\n", "line 25\nextra\n");
        let diff = unified_diff(&old, &new, "f", "g");
        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.starts_with("--- a/f\n+++ b/g\n"));
        assert_eq!(DiffStats::from_unified(&diff), DiffStats { added: 2, removed: 1 });
    }

    #[test]
    fn insertion_into_empty_file() {
        let diff = unified_diff("", "hello\n", "n", "n");
        assert!(diff.contains("@@ -0,0 +1,1 @@"));
        assert!(diff.contains("+hello"));
    }

    #[test]
    fn added_directive_at_top() {
        let diff = unified_diff("a\nb\n", "'use client';\n\na\nb\n", "p", "p");
        assert!(diff.contains("@@ -1,2 +1,4 @@"));
        assert_eq!(DiffStats::from_unified(&diff), DiffStats { added: 2, removed: 0 });
    }
}
