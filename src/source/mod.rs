//! Collaborator interfaces consumed by the core
//!
//! Source-control access and source parsing are supplied from outside the core.
//! [`crate::git::GitRepository`] and [`crate::parser::TreeSitterUnitParser`] are the
//! production implementations; [`InMemorySource`] replays scripted history.

mod memory;

pub use memory::InMemorySource;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Read access to file contents and diffs at a given commit
pub trait SourceControl: Send + Sync {
    /// Paths changed by `sha` relative to its first parent (all paths for a root)
    fn changed_files(&self, sha: &str) -> Result<Vec<String>>;

    /// Full content of `path` at `sha`, `None` if the file does not exist there
    fn file_content(&self, sha: &str, path: &str) -> Result<Option<String>>;

    /// Unified diff of `path` from `against_parent` to `sha`
    ///
    /// `None` when the file exists at neither commit. A file that did not change
    /// yields a diff without hunks.
    fn diff(&self, sha: &str, path: &str, against_parent: &str) -> Result<Option<String>>;
}

/// Syntactic kind of a parsed code unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// A whole file, used for file-level snapshots
    File,
    Function,
    Method,
    Class,
    /// Structs, enums, traits, interfaces, modules and other type-like declarations
    Type,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::File => "file",
            UnitKind::Function => "function",
            UnitKind::Method => "method",
            UnitKind::Class => "class",
            UnitKind::Type => "type",
        }
    }
}

/// A named, byte-ranged code unit inside one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    pub kind: UnitKind,
    /// Identifier of the unit, or "unknown" when the grammar exposes none
    pub name: String,
    pub byte_range: Range<usize>,
    /// 1-based inclusive line range
    pub line_range: (usize, usize),
}

impl CodeUnit {
    /// Slice of `content` covered by this unit
    pub fn body<'a>(&self, content: &'a str) -> &'a str {
        content.get(self.byte_range.clone()).unwrap_or("")
    }

    pub fn start_line(&self) -> usize {
        self.line_range.0
    }
}

/// Splits source text into code units for a given language
pub trait UnitParser: Send + Sync {
    /// Language name for a file path, `None` when the path is not parseable
    fn language_for(&self, path: &str) -> Option<String>;

    fn parse_units(&self, language: &str, content: &str) -> Result<Vec<CodeUnit>>;
}
