//! Schema Diff Engine
//!
//! Line-level comparison of two rendered SQL scripts. The engine never parses
//! DDL: it computes a longest-common-subsequence diff over text lines and
//! reports the delta as a unified patch. The one piece of schema awareness it
//! has is the header timestamp line, which always differs between two dumps
//! and is stripped before comparison.

use tracing::warn;

use crate::synthesize::GENERATED_PREFIX;

/// How the delta should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Three-line-context unified diff
    Unified,
    /// Forward-migration DDL synthesis. Not implemented for any delta shape
    /// yet; the engine falls back to unified output and says so.
    Migration,
}

/// Result of comparing two scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The scripts are semantically identical after header normalization
    Identical,
    /// Unified patch text
    Patch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Equal,
    Removed,
    Added,
}

struct DiffOp<'a> {
    change: Change,
    line: &'a str,
}

const CONTEXT_LINES: usize = 3;

/// The comparison engine
pub struct DiffEngine;

impl DiffEngine {
    /// Compare two rendered scripts labeled `label_a` / `label_b`.
    pub fn compare(
        text_a: &str,
        text_b: &str,
        label_a: &str,
        label_b: &str,
        mode: DiffMode,
    ) -> DiffOutcome {
        let lines_a = comparable_lines(text_a);
        let lines_b = comparable_lines(text_b);

        let ops = diff_lines(&lines_a, &lines_b);
        if ops.iter().all(|op| op.change == Change::Equal) {
            return DiffOutcome::Identical;
        }

        let mut patch = String::new();
        if mode == DiffMode::Migration {
            warn!("migration output is not implemented for this delta; falling back to unified");
            patch.push_str("-- migration output unavailable for this delta; unified diff follows\n");
        }
        patch.push_str(&render_unified(&ops, label_a, label_b));
        DiffOutcome::Patch(patch)
    }
}

/// Script lines that participate in the comparison. The generation timestamp
/// always differs between two dumps of the same schema and carries no
/// semantic weight, so it is dropped on both sides.
fn comparable_lines(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|line| !line.starts_with(GENERATED_PREFIX))
        .collect()
}

/// LCS diff over line slices, returned as a flat op sequence.
fn diff_lines<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<DiffOp<'a>> {
    let n = a.len();
    let m = b.len();

    // lcs[i][j] = length of the LCS of a[i..] and b[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(DiffOp { change: Change::Equal, line: a[i] });
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(DiffOp { change: Change::Removed, line: a[i] });
            i += 1;
        } else {
            ops.push(DiffOp { change: Change::Added, line: b[j] });
            j += 1;
        }
    }
    for &line in &a[i..] {
        ops.push(DiffOp { change: Change::Removed, line });
    }
    for &line in &b[j..] {
        ops.push(DiffOp { change: Change::Added, line });
    }
    ops
}

/// Render the op sequence as a unified patch with three lines of context.
fn render_unified(ops: &[DiffOp<'_>], label_a: &str, label_b: &str) -> String {
    // Prefix counts of lines consumed from each side, indexed by op position.
    let mut a_cnt = vec![0usize; ops.len() + 1];
    let mut b_cnt = vec![0usize; ops.len() + 1];
    for (i, op) in ops.iter().enumerate() {
        a_cnt[i + 1] = a_cnt[i] + usize::from(op.change != Change::Added);
        b_cnt[i + 1] = b_cnt[i] + usize::from(op.change != Change::Removed);
    }

    // Cluster changed ops, then widen each cluster by the context window.
    let mut clusters: Vec<(usize, usize)> = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        if op.change == Change::Equal {
            continue;
        }
        let lo = i.saturating_sub(CONTEXT_LINES);
        let hi = (i + CONTEXT_LINES).min(ops.len() - 1);
        match clusters.last_mut() {
            Some((_, prev_hi)) if lo <= *prev_hi + 1 => *prev_hi = hi,
            _ => clusters.push((lo, hi)),
        }
    }

    let mut out = String::new();
    out.push_str(&format!("--- {label_a}\n"));
    out.push_str(&format!("+++ {label_b}\n"));

    for (lo, hi) in clusters {
        let a_len = a_cnt[hi + 1] - a_cnt[lo];
        let b_len = b_cnt[hi + 1] - b_cnt[lo];
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            hunk_range(a_cnt[lo], a_len),
            hunk_range(b_cnt[lo], b_len)
        ));
        for op in &ops[lo..=hi] {
            let prefix = match op.change {
                Change::Equal => ' ',
                Change::Removed => '-',
                Change::Added => '+',
            };
            out.push(prefix);
            out.push_str(op.line);
            out.push('\n');
        }
    }
    out
}

/// Unified-diff range notation: `start,len`, with the length omitted when it
/// is exactly one and the start pinned to the preceding line for empty runs.
fn hunk_range(before: usize, len: usize) -> String {
    let start = if len == 0 { before } else { before + 1 };
    if len == 1 {
        start.to_string()
    } else {
        format!("{start},{len}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{SchemaSnapshot, Table};
    use crate::synthesize::SqlSynthesizer;
    use pretty_assertions::assert_eq;

    fn users_snapshot(body: &str) -> SchemaSnapshot {
        SchemaSnapshot::new(
            "app.db",
            vec![Table {
                name: "users".to_string(),
                sql: format!("CREATE TABLE users ({body})"),
                columns: vec![],
                foreign_keys: vec![],
                indexes: vec![],
            }],
            vec![],
            vec![],
        )
    }

    #[test]
    fn same_snapshot_rendered_twice_has_no_difference() {
        let snap = users_snapshot("id INTEGER PRIMARY KEY");
        let first = SqlSynthesizer::render(&snap).unwrap();

        let mut later = snap.clone();
        later.metadata.captured_at += chrono::Duration::hours(1);
        let second = SqlSynthesizer::render(&later).unwrap();

        // The raw texts differ (timestamp), the comparison must not.
        assert_ne!(first, second);
        assert_eq!(
            DiffEngine::compare(&first, &second, "a", "b", DiffMode::Unified),
            DiffOutcome::Identical
        );
    }

    #[test]
    fn added_column_shows_as_body_replacement() {
        let a = SqlSynthesizer::render(&users_snapshot("id INTEGER PRIMARY KEY")).unwrap();
        let b =
            SqlSynthesizer::render(&users_snapshot("id INTEGER PRIMARY KEY, email TEXT")).unwrap();

        let patch = match DiffEngine::compare(&a, &b, "old", "new", DiffMode::Unified) {
            DiffOutcome::Patch(p) => p,
            DiffOutcome::Identical => panic!("expected a delta"),
        };
        assert!(patch.contains("--- old\n"));
        assert!(patch.contains("+++ new\n"));
        assert!(patch.contains("-CREATE TABLE users (id INTEGER PRIMARY KEY);"));
        assert!(patch.contains("+CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);"));
    }

    #[test]
    fn both_empty_is_identical() {
        assert_eq!(
            DiffEngine::compare("", "", "a", "b", DiffMode::Unified),
            DiffOutcome::Identical
        );
    }

    #[test]
    fn pure_addition_against_empty_text() {
        let patch = match DiffEngine::compare("", "one\ntwo\n", "a", "b", DiffMode::Unified) {
            DiffOutcome::Patch(p) => p,
            DiffOutcome::Identical => panic!("expected a delta"),
        };
        assert!(patch.contains("@@ -0,0 +1,2 @@"));
        assert!(patch.contains("+one\n+two\n"));
    }

    #[test]
    fn context_window_and_hunk_header() {
        let a: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        let b = a.replace("line 5", "line five");

        let patch = match DiffEngine::compare(&a, &b, "a", "b", DiffMode::Unified) {
            DiffOutcome::Patch(p) => p,
            DiffOutcome::Identical => panic!("expected a delta"),
        };
        let expected = "\
--- a
+++ b
@@ -2,7 +2,7 @@
 line 2
 line 3
 line 4
-line 5
+line five
 line 6
 line 7
 line 8
";
        assert_eq!(patch, expected);
    }

    #[test]
    fn distant_changes_produce_separate_hunks() {
        let a: String = (1..=30).map(|i| format!("row {i}\n")).collect();
        let b = a.replace("row 3\n", "row three\n").replace("row 27\n", "row twentyseven\n");

        let patch = match DiffEngine::compare(&a, &b, "a", "b", DiffMode::Unified) {
            DiffOutcome::Patch(p) => p,
            DiffOutcome::Identical => panic!("expected a delta"),
        };
        assert_eq!(patch.matches("@@ ").count(), 2);
    }

    #[test]
    fn migration_mode_reports_its_fallback() {
        let patch = match DiffEngine::compare("a\n", "b\n", "x", "y", DiffMode::Migration) {
            DiffOutcome::Patch(p) => p,
            DiffOutcome::Identical => panic!("expected a delta"),
        };
        assert!(patch.starts_with("-- migration output unavailable"));
        assert!(patch.contains("--- x\n+++ y\n"));
    }

    #[test]
    fn migration_mode_with_no_delta_is_still_identical() {
        assert_eq!(
            DiffEngine::compare("same\n", "same\n", "x", "y", DiffMode::Migration),
            DiffOutcome::Identical
        );
    }
}
