use crate::patch::changed_line_count;
use crate::storage::{ChangeType, ChangedUnit};

const DECLARATION_KEYWORDS: &[&str] = &["def ", "fn ", "function ", "func ", "class "];

/// Approximate fraction of a file that changed
///
/// Counts added plus removed diff lines against the longer of the two versions. This
/// is a line-level approximation, not a minimal edit distance: a modified line counts
/// twice, so the ratio can exceed 1.0.
pub fn change_ratio(diff: &str, current: &str, parent: &str) -> f64 {
    let total = current.lines().count().max(parent.lines().count()).max(1);
    changed_line_count(diff) as f64 / total as f64
}

/// Guess which units a diff touched from declaration keywords on added/removed lines
///
/// Purely textual: a keyword inside a string or comment is reported, and a unit whose
/// body changed without its declaration line changing is missed.
pub fn changed_units(diff: &str) -> Vec<ChangedUnit> {
    diff.lines()
        .filter(|line| !line.starts_with("+++") && !line.starts_with("---"))
        .filter_map(|line| {
            let change = if line.starts_with('+') {
                ChangeType::Added
            } else if line.starts_with('-') {
                ChangeType::Removed
            } else {
                return None;
            };

            if !DECLARATION_KEYWORDS.iter().any(|k| line.contains(k)) {
                return None;
            }

            Some(ChangedUnit {
                name: declared_name(line),
                change,
            })
        })
        .collect()
}

/// Last whitespace-separated token before the first '('
fn declared_name(line: &str) -> String {
    match line.split_once('(') {
        Some((head, _)) => head
            .split_whitespace()
            .last()
            .unwrap_or("unknown")
            .to_string(),
        None => "unknown".to_string(),
    }
}
