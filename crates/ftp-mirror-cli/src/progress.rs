use colored::*;
use ftp_mirror_core::report::{FailureKind, MirrorReport, NodeOutcome, NodeStatus, SkipReason};
use ftp_mirror_core::transfer::format_size;
use ftp_mirror_core::{MirrorReporter, TreeEntry};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Spinner showing the entry in progress and running counters.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
    files: AtomicUsize,
    errors: AtomicUsize,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            files: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    fn set_message(&self, msg: String) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(msg);
            }
        }
    }

    fn counters(&self) -> String {
        format!(
            "[{} files, {} errors]",
            self.files.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed)
        )
    }
}

impl MirrorReporter for CliReporter {
    fn on_mirror_start(&self, remote_base: &str, local_base: &Path) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb.set_message(format!("Mirroring {} -> {}", remote_base, local_base.display()));
        pb.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(pb);
        }
    }

    fn on_entry(&self, entry: &TreeEntry) {
        self.set_message(format!("{} {}", self.counters(), entry.path));
    }

    fn on_transfer_start(&self, entry: &TreeEntry, size: Option<u64>) {
        self.set_message(format!(
            "{} Downloading {} ({})",
            self.counters(),
            entry.path,
            format_size(size)
        ));
    }

    fn on_outcome(&self, outcome: &NodeOutcome) {
        match outcome.status {
            NodeStatus::Transferred { .. } => {
                self.files.fetch_add(1, Ordering::Relaxed);
            }
            NodeStatus::Failed(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn on_mirror_complete(&self, report: &MirrorReport, duration: Duration) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
        eprintln!(
            "  {} Mirror complete: {} files in {:.2}s",
            "✓".green(),
            report.files_transferred,
            duration.as_secs_f64()
        );
    }
}

/// Prints the remote tree as it is discovered, for `list`.
pub struct TreePrinter;

impl MirrorReporter for TreePrinter {
    fn on_mirror_start(&self, remote_base: &str, _local_base: &Path) {
        println!("{}", remote_base.bold());
    }

    fn on_entry(&self, entry: &TreeEntry) {
        let indent = "  ".repeat(entry.depth + 1);
        if entry.is_dir() {
            println!("{}{}/", indent, entry.name.blue());
        } else {
            match entry.size {
                Some(size) => println!("{}{} ({})", indent, entry.name, HumanBytes(size)),
                None => println!("{}{}", indent, entry.name),
            }
        }
    }

    fn on_outcome(&self, outcome: &NodeOutcome) {
        if let NodeStatus::Failed(failure) = &outcome.status {
            println!("  {} {} ({})", "!".red(), outcome.remote_path, failure.message);
        }
    }
}

/// Coloured end-of-run summary.
pub fn print_summary(report: &MirrorReport, duration: Duration, dry_run: bool) {
    println!();
    for line in summary_lines(report, duration, dry_run) {
        println!("{}", line);
    }
}

fn summary_lines(report: &MirrorReport, duration: Duration, dry_run: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if dry_run {
        lines.push(format!(
            "{} entries listed in {:.2}s",
            format!("{}", report.entries_listed).cyan(),
            duration.as_secs_f64()
        ));
    } else {
        lines.push(format!(
            "{} folders created, {} files transferred ({}), {} skipped, {} filtered, {} failed",
            format!("{}", report.directories_created).green(),
            format!("{}", report.files_transferred).green(),
            HumanBytes(report.bytes_transferred),
            format!("{}", report.files_skipped).yellow(),
            report.files_filtered,
            format!("{}", report.files_failed).red(),
        ));
        lines.push(format!("Finished in {:.2}s", duration.as_secs_f64()));
    }

    if report.directories_skipped > 0 {
        lines.push(format!(
            "{} folders below the depth limit were not entered",
            format!("{}", report.directories_skipped).yellow()
        ));
    }

    let skipped: Vec<&NodeOutcome> = report.skipped().collect();
    if !skipped.is_empty() {
        lines.push(format!("{} skipped:", format!("{}", skipped.len()).yellow()));
        for outcome in skipped {
            if let NodeStatus::Skipped(reason) = outcome.status {
                let label = match reason {
                    SkipReason::Existing => "exists",
                    SkipReason::DepthLimit => "depth limit",
                    SkipReason::Filtered => "filtered",
                };
                lines.push(format!("  {} {}", label.yellow(), outcome.remote_path));
            }
        }
    }

    if !report.has_errors() {
        lines.push(format!("{}", "No errors".green()));
        return lines;
    }

    lines.push(format!("{} errors:", format!("{}", report.error_count()).red()));
    for outcome in report.failures() {
        if let NodeStatus::Failed(failure) = &outcome.status {
            let label = match failure.kind {
                FailureKind::AccessDenied => "access denied",
                FailureKind::Navigation => "cannot enter",
                FailureKind::Transfer => "transfer failed",
                FailureKind::LocalIo => "local error",
                FailureKind::Connection => "no connection",
            };
            lines.push(format!("  {} {}: {}", label.red(), outcome.remote_path, failure.message));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftp_mirror_core::report::Failure;
    use ftp_mirror_core::EntryKind;

    fn outcome(path: &str, kind: EntryKind, status: NodeStatus) -> NodeOutcome {
        NodeOutcome {
            remote_path: path.to_string(),
            local_path: None,
            kind,
            status,
        }
    }

    #[test]
    fn test_summary_lists_skipped_and_failed_paths() {
        colored::control::set_override(false);
        let mut report = MirrorReport::default();
        report.record(outcome("/a/f.txt", EntryKind::File, NodeStatus::Transferred { bytes: 3 }));
        report.record(outcome("/a/old.txt", EntryKind::File, NodeStatus::Skipped(SkipReason::Existing)));
        report.record(outcome("/a/deep", EntryKind::Directory, NodeStatus::Skipped(SkipReason::DepthLimit)));
        report.record(outcome(
            "/a/bad.bin",
            EntryKind::File,
            NodeStatus::Failed(Failure::new(FailureKind::Transfer, "550 gone")),
        ));

        let lines = summary_lines(&report, Duration::from_secs(1), false);

        assert_eq!(
            lines[0],
            "0 folders created, 1 files transferred (3 B), 1 skipped, 0 filtered, 1 failed"
        );
        assert!(lines.contains(&"2 skipped:".to_string()));
        assert!(lines.contains(&"  exists /a/old.txt".to_string()));
        assert!(lines.contains(&"  depth limit /a/deep".to_string()));
        assert_eq!(lines.last().unwrap(), "  transfer failed /a/bad.bin: 550 gone");
    }

    #[test]
    fn test_clean_run_says_no_errors() {
        colored::control::set_override(false);
        let mut report = MirrorReport::default();
        report.record(outcome("/a/f.txt", EntryKind::File, NodeStatus::Listed));

        let lines = summary_lines(&report, Duration::from_secs(2), true);
        assert_eq!(lines, vec!["1 entries listed in 2.00s", "No errors"]);
    }
}
