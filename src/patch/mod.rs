//! Unified diff generation and application
//!
//! Diffs are produced with git2's in-memory patch support so that stored diffs,
//! live diffs and test fixtures all share one format. Application is line based:
//! each hunk is located at its recorded position first and then searched outward,
//! the way `patch` tolerates offsets, but context must match exactly.

use git2::{DiffOptions, Patch};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
});

/// Errors raised while parsing or applying a unified diff
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Malformed hunk header: {0}")]
    MalformedHeader(String),

    #[error("Hunk starting at old line {old_start} is truncated")]
    Truncated { old_start: usize },

    #[error("Unexpected line inside hunk: {0:?}")]
    UnexpectedLine(String),

    #[error("Hunk starting at old line {old_start} does not match the content")]
    ContextMismatch { old_start: usize },

    #[error("Hunks overlap or are out of order at old line {0}")]
    OutOfOrder(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineOp {
    Context,
    Remove,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HunkLine {
    op: LineOp,
    text: String,
    /// False when followed by a "\ No newline at end of file" marker
    newline: bool,
}

/// One `@@` section of a unified diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    lines: Vec<HunkLine>,
}

impl Hunk {
    fn old_side(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|l| l.op != LineOp::Add)
            .map(|l| l.text.as_str())
    }
}

/// Generate a unified diff of one file between two contents
pub fn unified_diff(old: &str, new: &str, path: &str) -> anyhow::Result<String> {
    let mut opts = DiffOptions::new();
    opts.context_lines(3).interhunk_lines(0);

    let file_path = Path::new(path);
    let mut patch = Patch::from_buffers(
        old.as_bytes(),
        Some(file_path),
        new.as_bytes(),
        Some(file_path),
        Some(&mut opts),
    )?;
    let buf = patch.to_buf()?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Number of added or removed lines, not counting the `+++`/`---` file headers
///
/// Lines are classified by prefix only, so a removed line whose text starts with
/// `--` is also skipped. That matches how the change ratio has always been counted.
pub fn changed_line_count(diff: &str) -> usize {
    diff.lines()
        .filter(|line| {
            (line.starts_with('+') || line.starts_with('-'))
                && !line.starts_with("+++")
                && !line.starts_with("---")
        })
        .count()
}

/// Parse every hunk of a unified diff, ignoring file and commit headers
pub fn parse_hunks(diff: &str) -> Result<Vec<Hunk>, PatchError> {
    let lines: Vec<&str> = diff.split_inclusive('\n').collect();
    let mut hunks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if !line.starts_with("@@") {
            i += 1;
            continue;
        }

        let header = line.trim_end_matches(['\n', '\r']);
        let caps = HUNK_HEADER
            .captures(header)
            .ok_or_else(|| PatchError::MalformedHeader(header.to_string()))?;
        let number = |idx: usize, default: usize| -> Result<usize, PatchError> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| PatchError::MalformedHeader(header.to_string())),
                None => Ok(default),
            }
        };
        let mut hunk = Hunk {
            old_start: number(1, 0)?,
            old_len: number(2, 1)?,
            new_start: number(3, 0)?,
            new_len: number(4, 1)?,
            lines: Vec::new(),
        };
        i += 1;

        let (mut old_seen, mut new_seen) = (0, 0);
        while i < lines.len() {
            let raw = lines[i];
            let complete = old_seen == hunk.old_len && new_seen == hunk.new_len;
            if complete && !raw.starts_with('\\') {
                break;
            }

            let newline = raw.ends_with('\n');
            let body = raw.strip_suffix('\n').unwrap_or(raw);
            match body.chars().next() {
                Some('\\') => {
                    if let Some(previous) = hunk.lines.last_mut() {
                        previous.newline = false;
                    }
                }
                Some(' ') | None => {
                    hunk.lines.push(HunkLine {
                        op: LineOp::Context,
                        text: body.get(1..).unwrap_or("").to_string(),
                        newline,
                    });
                    old_seen += 1;
                    new_seen += 1;
                }
                Some('-') => {
                    hunk.lines.push(HunkLine {
                        op: LineOp::Remove,
                        text: body[1..].to_string(),
                        newline,
                    });
                    old_seen += 1;
                }
                Some('+') => {
                    hunk.lines.push(HunkLine {
                        op: LineOp::Add,
                        text: body[1..].to_string(),
                        newline,
                    });
                    new_seen += 1;
                }
                Some(_) => return Err(PatchError::UnexpectedLine(body.to_string())),
            }
            i += 1;

            if old_seen > hunk.old_len || new_seen > hunk.new_len {
                return Err(PatchError::Truncated {
                    old_start: hunk.old_start,
                });
            }
        }

        if old_seen != hunk.old_len || new_seen != hunk.new_len {
            return Err(PatchError::Truncated {
                old_start: hunk.old_start,
            });
        }
        hunks.push(hunk);
    }

    Ok(hunks)
}

/// Apply a unified diff to `original`, returning the patched content
///
/// A diff without hunks leaves the content unchanged.
pub fn apply_unified_diff(original: &str, diff: &str) -> Result<String, PatchError> {
    let hunks = parse_hunks(diff)?;
    if hunks.is_empty() {
        return Ok(original.to_string());
    }

    let old_lines: Vec<&str> = original.split_inclusive('\n').collect();
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;

    for hunk in &hunks {
        let expected = if hunk.old_len == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let start = locate_hunk(&old_lines, hunk, expected, cursor)?;

        for line in &old_lines[cursor..start] {
            out.push_str(line);
        }
        cursor = start;

        for line in &hunk.lines {
            match line.op {
                LineOp::Context => {
                    out.push_str(old_lines[cursor]);
                    cursor += 1;
                }
                LineOp::Remove => cursor += 1,
                LineOp::Add => {
                    out.push_str(&line.text);
                    if line.newline {
                        out.push('\n');
                    }
                }
            }
        }
    }

    for line in &old_lines[cursor..] {
        out.push_str(line);
    }
    Ok(out)
}

/// Find where a hunk's old side matches, starting at `expected` and moving outward
fn locate_hunk(
    old_lines: &[&str],
    hunk: &Hunk,
    expected: usize,
    min_start: usize,
) -> Result<usize, PatchError> {
    let old_side: Vec<&str> = hunk.old_side().collect();
    let matches_at = |start: usize| -> bool {
        start >= min_start
            && start + old_side.len() <= old_lines.len()
            && old_side
                .iter()
                .zip(&old_lines[start..])
                .all(|(want, have)| have.strip_suffix('\n').unwrap_or(have) == *want)
    };

    if matches_at(expected) {
        return Ok(expected);
    }
    if old_side.is_empty() {
        // Pure insertion: only the recorded position is meaningful
        return if expected >= min_start && expected <= old_lines.len() {
            Ok(expected)
        } else {
            Err(PatchError::OutOfOrder(hunk.old_start))
        };
    }

    let span = old_lines.len().max(expected);
    for offset in 1..=span {
        if expected >= offset && matches_at(expected - offset) {
            return Ok(expected - offset);
        }
        if matches_at(expected + offset) {
            return Ok(expected + offset);
        }
    }

    Err(PatchError::ContextMismatch {
        old_start: hunk.old_start,
    })
}
