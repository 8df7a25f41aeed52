use std::path::Path;
use std::time::Duration;

use crate::entry::TreeEntry;
use crate::report::{MirrorReport, NodeOutcome};

/// Trait for reporting mirror progress.
///
/// CLI implements with tracing/indicatif. Called from worker threads when
/// `workers > 1`, hence `Send + Sync`. All methods have default no-op
/// implementations.
pub trait MirrorReporter: Send + Sync {
    fn on_mirror_start(&self, _remote_base: &str, _local_base: &Path) {}
    /// Called once per classified entry, before it is recursed into or transferred.
    fn on_entry(&self, _entry: &TreeEntry) {}
    fn on_transfer_start(&self, _entry: &TreeEntry, _size: Option<u64>) {}
    fn on_outcome(&self, _outcome: &NodeOutcome) {}
    fn on_mirror_complete(&self, _report: &MirrorReport, _duration: Duration) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl MirrorReporter for SilentReporter {}
