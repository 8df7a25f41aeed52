//! Depth-first traversal of the remote tree.
//!
//! Every directory goes through two states: it is scanned (entered and
//! listed) and then done once all of its children have been handled. The
//! absolute remote path is threaded through the recursion, so nothing
//! depends on the session's working directory surviving a child visit.

use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::classify::{classify, DirectoryProbe};
use crate::config::{ListingMode, MirrorConfig};
use crate::entry::{EntryKind, TreeEntry};
use crate::error::Error;
use crate::path_map::{join_remote, MirrorPaths};
use crate::progress::MirrorReporter;
use crate::remote::{RemoteListing, RemoteSession, SessionError, SessionErrorKind};
use crate::report::{Failure, FailureKind, MirrorReport, NodeOutcome, NodeStatus, SkipReason};
use crate::transfer::TransferExecutor;

/// Traversal settings derived from [`MirrorConfig`].
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub max_depth: Option<usize>,
    pub exclude_names: Vec<String>,
    pub file_pattern: Pattern,
    pub sort_entries: bool,
    pub listing_mode: ListingMode,
    pub skip_existing: bool,
    /// List and classify only; no local changes, no downloads.
    pub dry_run: bool,
}

impl WalkOptions {
    pub fn from_config(config: &MirrorConfig, dry_run: bool) -> Result<Self, Error> {
        let file_pattern = Pattern::new(&config.file_pattern)
            .map_err(|e| Error::InvalidConfig(format!("invalid file_pattern: {}", e)))?;
        Ok(Self {
            max_depth: config.max_depth,
            exclude_names: config.exclude_names.clone(),
            file_pattern,
            sort_entries: config.sort_entries,
            listing_mode: config.listing_mode,
            skip_existing: config.skip_existing,
            dry_run,
        })
    }

    fn below_depth_limit(&self, depth: usize) -> bool {
        self.max_depth.map_or(true, |max| depth < max)
    }

    fn matches_pattern(&self, name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        self.file_pattern.matches_with(name, options)
    }
}

pub struct MirrorWalker<'a, R: MirrorReporter + ?Sized> {
    paths: &'a MirrorPaths,
    options: &'a WalkOptions,
    reporter: &'a R,
    transfer: TransferExecutor,
    report: MirrorReport,
    /// When set, subdirectories of the root are collected here instead of
    /// being visited, so they can be handed to other connections.
    deferred: Option<Vec<TreeEntry>>,
}

impl<'a, R: MirrorReporter + ?Sized> MirrorWalker<'a, R> {
    pub fn new(paths: &'a MirrorPaths, options: &'a WalkOptions, reporter: &'a R) -> Self {
        Self {
            paths,
            options,
            reporter,
            transfer: TransferExecutor::new(options.skip_existing),
            report: MirrorReport::default(),
            deferred: None,
        }
    }

    pub fn deferring_subdirectories(mut self) -> Self {
        self.deferred = Some(Vec::new());
        self
    }

    /// Mirrors the whole tree under the remote base.
    pub fn run<S: RemoteSession + ?Sized>(mut self, session: &mut S) -> MirrorReport {
        self.visit_root(session);
        self.report
    }

    /// Handles the remote base itself. Its local counterpart is created by the
    /// caller and is not counted.
    pub fn visit_root<S: RemoteSession + ?Sized>(&mut self, session: &mut S) {
        let root = self.paths.remote_base.clone();
        info!("Scanning {}", root);
        match self.enter_and_list(session, &root) {
            Ok(children) => self.visit_children(session, &root, children, 0),
            Err(failure) => {
                warn!("Cannot scan {}: {}", root, failure.message);
                self.record(&root, EntryKind::Directory, None, NodeStatus::Failed(failure));
            }
        }
    }

    /// Scans one directory entry and recurses into its children.
    pub fn visit_directory<S: RemoteSession + ?Sized>(&mut self, session: &mut S, entry: &TreeEntry) {
        debug!("{}Scanning {}", entry.indent(), entry.path);
        let children = match self.enter_and_list(session, &entry.path) {
            Ok(children) => children,
            Err(failure) => {
                warn!("{}Skipping {}: {}", entry.indent(), entry.path, failure.message);
                self.record(&entry.path, EntryKind::Directory, None, NodeStatus::Failed(failure));
                return;
            }
        };

        let local = self.paths.local_path_for(&entry.path);
        if self.options.dry_run {
            self.record(&entry.path, EntryKind::Directory, Some(local), NodeStatus::Listed);
        } else {
            // Must exist before any child is written.
            if let Err(e) = fs::create_dir_all(&local) {
                let err = Error::LocalIo {
                    path: local.display().to_string(),
                    source: e,
                };
                warn!("{}Skipping {}: {}", entry.indent(), entry.path, err);
                self.record(
                    &entry.path,
                    EntryKind::Directory,
                    Some(local),
                    NodeStatus::Failed(Failure::from(&err)),
                );
                return;
            }
            info!("{}Created folder {}", entry.indent(), local.display());
            self.record(&entry.path, EntryKind::Directory, Some(local), NodeStatus::DirectoryCreated);
        }

        self.visit_children(session, &entry.path, children, entry.depth + 1);
    }

    /// Report so far, plus any subdirectories held back for other workers.
    pub fn finish(self) -> (MirrorReport, Vec<TreeEntry>) {
        (self.report, self.deferred.unwrap_or_default())
    }

    /// Records a failure for a whole subtree that could not be started.
    pub fn record_subtree_failure(&mut self, entry: &TreeEntry, failure: Failure) {
        warn!("Skipping {}: {}", entry.path, failure.message);
        self.record(&entry.path, entry.kind, None, NodeStatus::Failed(failure));
    }

    fn visit_children<S: RemoteSession + ?Sized>(
        &mut self,
        session: &mut S,
        dir: &str,
        children: Vec<RemoteListing>,
        depth: usize,
    ) {
        // Local names handed out in this directory. Sanitizing can fold two
        // remote names into one.
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();

        for listing in children {
            let path = join_remote(dir, &listing.name);
            match classify(session, &path, &listing) {
                DirectoryProbe::Directory => {
                    let entry = TreeEntry::directory(&listing.name, &path, depth);
                    self.reporter.on_entry(&entry);
                    if !self.options.below_depth_limit(depth) {
                        info!("{}[SKIP] depth limit reached: {}", entry.indent(), path);
                        self.record(
                            &path,
                            EntryKind::Directory,
                            None,
                            NodeStatus::Skipped(SkipReason::DepthLimit),
                        );
                    } else if self.claim(&mut claimed, &entry) {
                        if depth == 0 && self.deferred.is_some() {
                            self.deferred.get_or_insert_with(Vec::new).push(entry);
                        } else {
                            self.visit_directory(session, &entry);
                        }
                    }
                }
                DirectoryProbe::File => {
                    let entry = TreeEntry::file(&listing.name, &path, depth, listing.size);
                    self.reporter.on_entry(&entry);
                    if !self.options.matches_pattern(&entry.name) {
                        info!("{}[SKIP] does not match file_pattern: {}", entry.indent(), path);
                        let local = self.paths.local_path_for(&entry.path);
                        self.record(
                            &path,
                            EntryKind::File,
                            Some(local),
                            NodeStatus::Skipped(SkipReason::Filtered),
                        );
                    } else if self.claim(&mut claimed, &entry) {
                        self.visit_file(session, &entry);
                    }
                }
                DirectoryProbe::AccessDenied => {
                    let failure = Failure::new(FailureKind::AccessDenied, "access denied");
                    warn!("Skipping {}: access denied", path);
                    self.record(&path, EntryKind::Directory, None, NodeStatus::Failed(failure));
                }
            }
        }
    }

    /// Reserves the local path of `entry` within its directory. A second
    /// remote name landing on the same local path is recorded as a local
    /// failure and must not be mirrored.
    fn claim(&mut self, claimed: &mut HashMap<PathBuf, String>, entry: &TreeEntry) -> bool {
        let local = self.paths.local_path_for(&entry.path);
        if let Some(owner) = claimed.get(&local) {
            let message = format!(
                "local path {} already used by {}",
                local.display(),
                owner
            );
            warn!("{}Skipping {}: {}", entry.indent(), entry.path, message);
            self.record(
                &entry.path,
                entry.kind,
                Some(local),
                NodeStatus::Failed(Failure::new(FailureKind::LocalIo, message)),
            );
            return false;
        }
        claimed.insert(local, entry.path.clone());
        true
    }

    fn visit_file<S: RemoteSession + ?Sized>(&mut self, session: &mut S, entry: &TreeEntry) {
        let local = self.paths.local_path_for(&entry.path);

        if self.options.dry_run {
            self.record(&entry.path, EntryKind::File, Some(local), NodeStatus::Listed);
            return;
        }

        let status = self.transfer.execute(session, entry, &local, self.reporter);
        self.record(&entry.path, EntryKind::File, Some(local), status);
    }

    fn enter_and_list<S: RemoteSession + ?Sized>(
        &self,
        session: &mut S,
        dir: &str,
    ) -> Result<Vec<RemoteListing>, Failure> {
        session
            .change_dir(dir)
            .map_err(|e| Failure::navigation(&e))?;

        let detailed = match self.options.listing_mode {
            ListingMode::Nlst => None,
            ListingMode::Auto | ListingMode::Mlsd => session
                .list_detailed()
                .map_err(|e| Failure::navigation(&e))?,
        };

        let mut listing = match detailed {
            Some(listing) => listing,
            None if self.options.listing_mode == ListingMode::Mlsd => {
                let err = SessionError::new(
                    SessionErrorKind::Unsupported,
                    "server offers no structured listing",
                );
                return Err(Failure::navigation(&err));
            }
            None => session
                .list_names()
                .map_err(|e| Failure::navigation(&e))?
                .iter()
                .map(|name| RemoteListing::name_only(name))
                .collect(),
        };

        listing.retain(|l| is_child_name(&l.name));
        listing.retain(|l| !self.options.exclude_names.iter().any(|x| x == &l.name));
        if self.options.sort_entries {
            listing.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(listing)
    }

    fn record(
        &mut self,
        remote_path: &str,
        kind: EntryKind,
        local_path: Option<PathBuf>,
        status: NodeStatus,
    ) {
        let outcome = NodeOutcome {
            remote_path: remote_path.to_string(),
            local_path,
            kind,
            status,
        };
        self.reporter.on_outcome(&outcome);
        self.report.record(outcome);
    }
}

/// Self and parent entries, and anything that is not a single path
/// component, never name a child.
fn is_child_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::progress::SilentReporter;
    use crate::remote::memory::{MemoryConnector, MemorySession, MemoryTree};
    use crate::remote::{ConnectionSettings, Connector};
    use std::path::Path;
    use std::sync::Mutex;

    fn connect(connector: &MemoryConnector) -> MemorySession {
        let settings = ConnectionSettings {
            host: "memory".to_string(),
            port: 21,
            passive_mode: true,
        };
        let creds = Credentials {
            username: "anonymous".to_string(),
            password: String::new(),
        };
        connector.connect(&settings, &creds).unwrap()
    }

    fn options(config: &MirrorConfig, dry_run: bool) -> WalkOptions {
        WalkOptions::from_config(config, dry_run).unwrap()
    }

    #[derive(Default)]
    struct RecordingReporter {
        entries: Mutex<Vec<String>>,
    }

    impl MirrorReporter for RecordingReporter {
        fn on_entry(&self, entry: &TreeEntry) {
            self.entries.lock().unwrap().push(entry.path.clone());
        }
    }

    #[test]
    fn test_dry_run_lists_every_entry_once() {
        let tree = MemoryTree::new()
            .file("/a/b/file1.txt", b"0123456789")
            .dir("/a/c")
            .file("/a/file2.txt", b"");
        let connector = MemoryConnector::new(tree);
        let mut session = connect(&connector);

        let config = MirrorConfig::new("memory");
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/a", Path::new("/nonexistent-out"), true);
        let reporter = RecordingReporter::default();

        let report = MirrorWalker::new(&paths, &opts, &reporter).run(&mut session);

        let seen = reporter.entries.lock().unwrap().clone();
        assert_eq!(seen, vec!["/a/b", "/a/b/file1.txt", "/a/c", "/a/file2.txt"]);
        assert_eq!(report.entries_listed, 4);
        assert_eq!(report.directories_created, 0);
        assert!(!Path::new("/nonexistent-out").exists());
    }

    #[test]
    fn test_depth_limit_skips_deeper_directories() {
        let tree = MemoryTree::new()
            .file("/top.txt", b"t")
            .file("/d1/mid.txt", b"m")
            .file("/d1/d2/deep.txt", b"d");
        let connector = MemoryConnector::new(tree);
        let mut session = connect(&connector);

        let mut config = MirrorConfig::new("memory");
        config.max_depth = Some(1);
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/", Path::new("/nonexistent-out"), true);

        let report = MirrorWalker::new(&paths, &opts, &SilentReporter).run(&mut session);
        let listed: Vec<&str> = report
            .outcomes
            .iter()
            .filter(|o| o.status == NodeStatus::Listed)
            .map(|o| o.remote_path.as_str())
            .collect();
        assert_eq!(listed, vec!["/d1", "/d1/mid.txt", "/top.txt"]);
        assert_eq!(report.directories_skipped, 1);
    }

    #[test]
    fn test_file_pattern_filters_files() {
        let tree = MemoryTree::new()
            .file("/reports/Q1.XLSX", b"x")
            .file("/reports/notes.txt", b"n");
        let connector = MemoryConnector::new(tree);
        let mut session = connect(&connector);

        let mut config = MirrorConfig::new("memory");
        config.file_pattern = "*.xlsx".to_string();
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/", Path::new("/nonexistent-out"), true);

        let report = MirrorWalker::new(&paths, &opts, &SilentReporter).run(&mut session);
        assert_eq!(report.files_filtered, 1);
        assert!(report
            .outcomes
            .iter()
            .any(|o| o.remote_path == "/reports/Q1.XLSX" && o.status == NodeStatus::Listed));
    }

    #[test]
    fn test_structured_only_mode_fails_without_mlsd() {
        let connector = MemoryConnector::new(MemoryTree::new().file("/f.txt", b"x"));
        let mut session = connect(&connector);

        let mut config = MirrorConfig::new("memory");
        config.listing_mode = ListingMode::Mlsd;
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/", Path::new("/nonexistent-out"), true);

        let report = MirrorWalker::new(&paths, &opts, &SilentReporter).run(&mut session);
        assert_eq!(report.navigation_errors, 1);
        assert_eq!(report.outcomes[0].remote_path, "/");
    }

    #[test]
    fn test_deferring_collects_root_subdirectories() {
        let tree = MemoryTree::new()
            .file("/root.txt", b"r")
            .file("/x/inner.txt", b"i")
            .dir("/y/z");
        let connector = MemoryConnector::new(tree).with_structured_listing();
        let mut session = connect(&connector);

        let config = MirrorConfig::new("memory");
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/", Path::new("/nonexistent-out"), true);

        let mut walker = MirrorWalker::new(&paths, &opts, &SilentReporter).deferring_subdirectories();
        walker.visit_root(&mut session);
        let (report, deferred) = walker.finish();

        let deferred: Vec<&str> = deferred.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(deferred, vec!["/x", "/y"]);
        assert_eq!(report.entries_listed, 1);
    }

    #[test]
    fn test_self_and_parent_entries_ignored_with_custom_excludes() {
        let tree = MemoryTree::new().file("/a/f.txt", b"f").file("/a/tmp/x.txt", b"x");
        let connector = MemoryConnector::new(tree);
        let mut session = connect(&connector);

        let mut config = MirrorConfig::new("memory");
        config.exclude_names = vec!["tmp".to_string()];
        config.listing_mode = ListingMode::Nlst;
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/a", Path::new("/nonexistent-out"), true);

        let report = MirrorWalker::new(&paths, &opts, &SilentReporter).run(&mut session);
        let seen: Vec<&str> = report.outcomes.iter().map(|o| o.remote_path.as_str()).collect();
        assert_eq!(seen, vec!["/a/f.txt"]);
    }

    #[test]
    fn test_child_name_rules() {
        assert!(is_child_name("file.txt"));
        assert!(is_child_name(".hidden"));
        assert!(!is_child_name("."));
        assert!(!is_child_name(".."));
        assert!(!is_child_name(""));
        assert!(!is_child_name("sub/file.txt"));
    }

    fn failure_kind(report: &MirrorReport, path: &str) -> Option<FailureKind> {
        report.outcomes.iter().find(|o| o.remote_path == path).and_then(|o| match &o.status {
            NodeStatus::Failed(failure) => Some(failure.kind),
            _ => None,
        })
    }

    #[test]
    fn test_files_folding_to_one_local_name_fail_the_second() {
        let tree = MemoryTree::new().file("/x*.txt", b"first").file("/x?.txt", b"second");
        let connector = MemoryConnector::new(tree);
        let mut session = connect(&connector);

        let config = MirrorConfig::new("memory");
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/", Path::new("/nonexistent-out"), true);

        let report = MirrorWalker::new(&paths, &opts, &SilentReporter).run(&mut session);
        assert_eq!(report.entries_listed, 1);
        assert_eq!(failure_kind(&report, "/x?.txt"), Some(FailureKind::LocalIo));
        assert_eq!(report.local_errors, 1);
    }

    #[test]
    fn test_directories_folding_to_one_local_name_are_not_merged() {
        let tree = MemoryTree::new().file("/d/one.txt", b"1").file("/d./two.txt", b"2");
        let connector = MemoryConnector::new(tree);
        let mut session = connect(&connector);

        let config = MirrorConfig::new("memory");
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/", Path::new("/nonexistent-out"), true);

        let report = MirrorWalker::new(&paths, &opts, &SilentReporter).run(&mut session);
        assert_eq!(failure_kind(&report, "/d."), Some(FailureKind::LocalIo));
        assert!(report.outcomes.iter().any(|o| o.remote_path == "/d/one.txt"));
        assert!(!report.outcomes.iter().any(|o| o.remote_path == "/d./two.txt"));
    }

    #[test]
    fn test_distinct_names_without_sanitizing_do_not_collide() {
        let tree = MemoryTree::new().file("/x*.txt", b"first").file("/x?.txt", b"second");
        let connector = MemoryConnector::new(tree);
        let mut session = connect(&connector);

        let config = MirrorConfig::new("memory");
        let opts = options(&config, true);
        let paths = MirrorPaths::new("/", Path::new("/nonexistent-out"), false);

        let report = MirrorWalker::new(&paths, &opts, &SilentReporter).run(&mut session);
        assert_eq!(report.entries_listed, 2);
        assert!(!report.has_errors());
    }
}
