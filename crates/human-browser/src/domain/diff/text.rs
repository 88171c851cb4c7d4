//! Line diff over rendered snapshot trees (Myers, O(ND)).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit<'a> {
    pub kind: EditKind,
    pub line: &'a str,
}

impl<'a> Edit<'a> {
    fn new(kind: EditKind, line: &'a str) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextDiff {
    pub diff: String,
    pub additions: usize,
    pub removals: usize,
    pub unchanged: usize,
    pub changed: bool,
}

/// Diffs two texts line by line (split on `\n`).
///
/// Each output line is prefixed with `+ `, `- `, or two spaces.
pub fn diff_text(before: &str, after: &str) -> TextDiff {
    let before_lines: Vec<&str> = before.split('\n').collect();
    let after_lines: Vec<&str> = after.split('\n').collect();
    let edits = myers_diff(&before_lines, &after_lines);

    let mut additions = 0;
    let mut removals = 0;
    let mut unchanged = 0;
    let mut lines = Vec::with_capacity(edits.len());

    for edit in &edits {
        match edit.kind {
            EditKind::Equal => {
                unchanged += 1;
                lines.push(format!("  {}", edit.line));
            }
            EditKind::Insert => {
                additions += 1;
                lines.push(format!("+ {}", edit.line));
            }
            EditKind::Delete => {
                removals += 1;
                lines.push(format!("- {}", edit.line));
            }
        }
    }

    TextDiff {
        diff: lines.join("\n"),
        additions,
        removals,
        unchanged,
        changed: additions > 0 || removals > 0,
    }
}

/// Minimal edit script turning `before` into `after`, in original order.
///
/// Ties prefer the insertion (down) move when `k == -d` or when the diagonal
/// above reaches further, so identical inputs always yield identical scripts.
pub fn myers_diff<'a>(before: &[&'a str], after: &[&'a str]) -> Vec<Edit<'a>> {
    let n = before.len() as isize;
    let m = after.len() as isize;
    let max = n + m;

    if max == 0 {
        return Vec::new();
    }

    if before == after {
        return before
            .iter()
            .map(|&line| Edit::new(EditKind::Equal, line))
            .collect();
    }

    let mut v = vec![-1isize; (2 * max + 1) as usize];
    v[(max + 1) as usize] = 0;
    let mut trace: Vec<Frontier> = Vec::new();

    for d in 0..=max {
        trace.push(Frontier::capture(&v, d, max));

        let mut k = -d;
        while k <= d {
            let idx = k + max;
            let mut x = if k == -d || (k != d && at(&v, idx - 1) < at(&v, idx + 1)) {
                at(&v, idx + 1)
            } else {
                at(&v, idx - 1) + 1
            };
            let mut y = x - k;

            while x >= 0
                && y >= 0
                && x < n
                && y < m
                && before[x as usize] == after[y as usize]
            {
                x += 1;
                y += 1;
            }

            v[idx as usize] = x;

            if x >= n && y >= m {
                return backtrack(&trace, before, after);
            }
            k += 2;
        }
    }

    backtrack(&trace, before, after)
}

fn at(v: &[isize], idx: isize) -> isize {
    usize::try_from(idx)
        .ok()
        .and_then(|i| v.get(i).copied())
        .unwrap_or(-1)
}

/// Furthest-reaching x per diagonal before round `d`, kept for `|k| <= d + 1`.
///
/// Round `d` only reads diagonals within one step of `[-d, d]`, so the trace
/// stays quadratic in the edit distance rather than in the input size.
struct Frontier {
    low: isize,
    values: Vec<isize>,
}

impl Frontier {
    fn capture(v: &[isize], d: isize, max: isize) -> Self {
        let low = (-(d + 1)).max(-max);
        let high = (d + 1).min(max);
        Self {
            low,
            values: v[(low + max) as usize..=(high + max) as usize].to_vec(),
        }
    }

    fn get(&self, k: isize) -> isize {
        at(&self.values, k - self.low)
    }
}

fn backtrack<'a>(trace: &[Frontier], before: &[&'a str], after: &[&'a str]) -> Vec<Edit<'a>> {
    let mut edits = Vec::with_capacity(before.len() + after.len());
    let mut x = before.len() as isize;
    let mut y = after.len() as isize;

    for d in (1..trace.len()).rev() {
        let frontier = &trace[d];
        let d = d as isize;
        let k = x - y;

        let prev_k = if k == -d || (k != d && frontier.get(k - 1) < frontier.get(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = frontier.get(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            edits.push(Edit::new(EditKind::Equal, before[x as usize]));
        }

        if x == prev_x {
            y -= 1;
            edits.push(Edit::new(EditKind::Insert, after[y as usize]));
        } else {
            x -= 1;
            edits.push(Edit::new(EditKind::Delete, before[x as usize]));
        }
    }

    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        edits.push(Edit::new(EditKind::Equal, before[x as usize]));
    }

    edits.reverse();
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rebuild<'a>(edits: &[Edit<'a>], keep: EditKind) -> Vec<&'a str> {
        edits
            .iter()
            .filter(|edit| edit.kind == EditKind::Equal || edit.kind == keep)
            .map(|edit| edit.line)
            .collect()
    }

    #[test]
    fn test_identical_text_is_unchanged() {
        let tree = "- button \"Log in\" [ref=e1]\n- textbox \"Email\" [ref=e2]";
        let diff = diff_text(tree, tree);
        assert_eq!(diff.additions, 0);
        assert_eq!(diff.removals, 0);
        assert_eq!(diff.unchanged, 2);
        assert!(!diff.changed);
        assert_eq!(
            diff.diff,
            "  - button \"Log in\" [ref=e1]\n  - textbox \"Email\" [ref=e2]"
        );
    }

    #[test]
    fn test_appended_node_is_an_addition() {
        let before = "- button \"Log in\" [ref=e1]";
        let after = "- button \"Log in\" [ref=e1]\n- link \"Help\" [ref=e2]";
        let diff = diff_text(before, after);
        assert_eq!(diff.additions, 1);
        assert_eq!(diff.removals, 0);
        assert_eq!(diff.unchanged, 1);
        assert!(diff.changed);
        assert!(diff.diff.ends_with("+ - link \"Help\" [ref=e2]"));
    }

    #[test]
    fn test_replaced_line_deletes_before_inserting() {
        let edits = myers_diff(&["a"], &["b"]);
        assert_eq!(
            edits,
            vec![
                Edit::new(EditKind::Delete, "a"),
                Edit::new(EditKind::Insert, "b"),
            ]
        );
    }

    #[test]
    fn test_empty_sequences() {
        assert!(myers_diff(&[], &[]).is_empty());
        let inserted = myers_diff(&[], &["x", "y"]);
        assert!(inserted.iter().all(|e| e.kind == EditKind::Insert));
        let deleted = myers_diff(&["x", "y"], &[]);
        assert!(deleted.iter().all(|e| e.kind == EditKind::Delete));
    }

    #[test]
    fn test_classic_example_is_minimal() {
        let before = ["a", "b", "c", "a", "b", "b", "a"];
        let after = ["c", "b", "a", "b", "a", "c"];
        let edits = myers_diff(&before, &after);
        let changes = edits.iter().filter(|e| e.kind != EditKind::Equal).count();
        assert_eq!(changes, 5);
        assert_eq!(rebuild(&edits, EditKind::Delete), before.to_vec());
        assert_eq!(rebuild(&edits, EditKind::Insert), after.to_vec());
    }

    #[test]
    fn test_large_input_with_few_edits() {
        let before: Vec<String> = (0..5000).map(|i| format!("- text \"row {i}\"")).collect();
        let mut after = before.clone();
        after[10] = "- text \"changed\"".to_string();
        after.insert(4000, "- link \"new\"".to_string());

        let diff = diff_text(&before.join("\n"), &after.join("\n"));
        assert_eq!(diff.removals, 1);
        assert_eq!(diff.additions, 2);
        assert_eq!(diff.unchanged, 4999);
    }

    #[test]
    fn test_disjoint_inputs_replace_everything() {
        let before: Vec<String> = (0..300).map(|i| format!("a{i}")).collect();
        let after: Vec<String> = (0..200).map(|i| format!("b{i}")).collect();
        let diff = diff_text(&before.join("\n"), &after.join("\n"));
        assert_eq!(diff.removals, 300);
        assert_eq!(diff.additions, 200);
        assert_eq!(diff.unchanged, 0);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let before = "x\ny\nz\nx";
        let after = "y\nx\nz\nz";
        assert_eq!(diff_text(before, after), diff_text(before, after));
    }

    proptest! {
        #[test]
        fn prop_identical_sequences_have_no_changes(lines in prop::collection::vec("[a-c]{0,2}", 0..24)) {
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            let edits = myers_diff(&refs, &refs);
            prop_assert_eq!(edits.len(), refs.len());
            prop_assert!(edits.iter().all(|e| e.kind == EditKind::Equal));
        }

        #[test]
        fn prop_edits_rebuild_both_sides(
            before in prop::collection::vec("[a-d]", 0..20),
            after in prop::collection::vec("[a-d]", 0..20),
        ) {
            let b: Vec<&str> = before.iter().map(String::as_str).collect();
            let a: Vec<&str> = after.iter().map(String::as_str).collect();
            let edits = myers_diff(&b, &a);
            prop_assert_eq!(rebuild(&edits, EditKind::Delete), b);
            prop_assert_eq!(rebuild(&edits, EditKind::Insert), a);
        }

        #[test]
        fn prop_counts_match_line_totals(
            before in prop::collection::vec("[a-c]", 1..16),
            after in prop::collection::vec("[a-c]", 1..16),
        ) {
            let diff = diff_text(&before.join("\n"), &after.join("\n"));
            prop_assert_eq!(diff.removals + diff.unchanged, before.len());
            prop_assert_eq!(diff.additions + diff.unchanged, after.len());
            prop_assert_eq!(diff.changed, diff.additions + diff.removals > 0);
        }
    }
}
