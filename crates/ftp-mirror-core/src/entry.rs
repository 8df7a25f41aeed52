use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Directory,
    File,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Directory => write!(f, "directory"),
            EntryKind::File => write!(f, "file"),
        }
    }
}

/// One item found during a traversal. Built while scanning a directory and
/// dropped as soon as it has been recursed into or transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub kind: EntryKind,
    /// Leaf name as reported by the remote listing.
    pub name: String,
    /// Full remote path.
    pub path: String,
    pub depth: usize,
    /// Files only, when the remote side reports it.
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn directory(name: &str, path: &str, depth: usize) -> Self {
        Self {
            kind: EntryKind::Directory,
            name: name.to_string(),
            path: path.to_string(),
            depth,
            size: None,
        }
    }

    pub fn file(name: &str, path: &str, depth: usize, size: Option<u64>) -> Self {
        Self {
            kind: EntryKind::File,
            name: name.to_string(),
            path: path.to_string(),
            depth,
            size,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Two spaces per level.
    pub fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }
}
