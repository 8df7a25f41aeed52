use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::entry::EntryKind;
use crate::error::Error;
use crate::remote::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The mapped local path already exists.
    Existing,
    /// The directory lies below `max_depth`.
    DepthLimit,
    /// The file name does not match `file_pattern`.
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Navigation,
    AccessDenied,
    Transfer,
    LocalIo,
    Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A directory that could not be entered or listed.
    pub fn navigation(err: &SessionError) -> Self {
        let kind = if err.is_permission_denied() {
            FailureKind::AccessDenied
        } else {
            FailureKind::Navigation
        };
        Self::new(kind, err.to_string())
    }
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::Connection(_) | Error::Credentials(_) => FailureKind::Connection,
            Error::Transfer { .. } => FailureKind::Transfer,
            Error::LocalIo { .. } | Error::Io(_) | Error::Csv(_) => FailureKind::LocalIo,
            Error::Config(_) | Error::InvalidConfig(_) => FailureKind::Navigation,
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    DirectoryCreated,
    Transferred { bytes: u64 },
    Skipped(SkipReason),
    Failed(Failure),
    /// Seen during a dry run.
    Listed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutcome {
    pub remote_path: String,
    pub local_path: Option<PathBuf>,
    pub kind: EntryKind,
    pub status: NodeStatus,
}

impl NodeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, NodeStatus::Failed(_))
    }
}

/// Everything that happened during one mirror run, node by node.
#[derive(Debug, Clone, Default)]
pub struct MirrorReport {
    /// Local directories ensured for remote directories, not counting the root.
    pub directories_created: usize,
    pub directories_skipped: usize,
    pub files_transferred: usize,
    pub files_skipped: usize,
    pub files_filtered: usize,
    pub files_failed: usize,
    pub navigation_errors: usize,
    pub local_errors: usize,
    pub entries_listed: usize,
    pub bytes_transferred: u64,
    pub outcomes: Vec<NodeOutcome>,
}

impl MirrorReport {
    pub fn record(&mut self, outcome: NodeOutcome) {
        match &outcome.status {
            NodeStatus::DirectoryCreated => self.directories_created += 1,
            NodeStatus::Transferred { bytes } => {
                self.files_transferred += 1;
                self.bytes_transferred += bytes;
            }
            NodeStatus::Skipped(SkipReason::Existing) => self.files_skipped += 1,
            NodeStatus::Skipped(SkipReason::Filtered) => self.files_filtered += 1,
            NodeStatus::Skipped(SkipReason::DepthLimit) => self.directories_skipped += 1,
            NodeStatus::Failed(failure) => match failure.kind {
                FailureKind::Navigation | FailureKind::AccessDenied | FailureKind::Connection => {
                    self.navigation_errors += 1
                }
                FailureKind::Transfer => self.files_failed += 1,
                FailureKind::LocalIo => self.local_errors += 1,
            },
            NodeStatus::Listed => self.entries_listed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn merge(&mut self, other: MirrorReport) {
        for outcome in other.outcomes {
            self.record(outcome);
        }
    }

    pub fn error_count(&self) -> usize {
        self.navigation_errors + self.local_errors + self.files_failed
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, NodeStatus::Skipped(_)))
    }

    /// One row per node outcome.
    pub fn write_csv(&self, path: &Path) -> Result<(), Error> {
        let mut wtr = csv::Writer::from_path(path)?;
        for outcome in &self.outcomes {
            wtr.serialize(CsvRow::from(outcome))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    remote_path: &'a str,
    local_path: String,
    kind: EntryKind,
    status: &'static str,
    bytes: Option<u64>,
    detail: String,
}

impl<'a> From<&'a NodeOutcome> for CsvRow<'a> {
    fn from(outcome: &'a NodeOutcome) -> Self {
        let (status, bytes, detail) = match &outcome.status {
            NodeStatus::DirectoryCreated => ("created", None, String::new()),
            NodeStatus::Transferred { bytes } => ("transferred", Some(*bytes), String::new()),
            NodeStatus::Skipped(reason) => ("skipped", None, format!("{:?}", reason)),
            NodeStatus::Failed(failure) => ("failed", None, failure.to_string()),
            NodeStatus::Listed => ("listed", None, String::new()),
        };
        Self {
            remote_path: &outcome.remote_path,
            local_path: outcome
                .local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            kind: outcome.kind,
            status,
            bytes,
            detail,
        }
    }
}
