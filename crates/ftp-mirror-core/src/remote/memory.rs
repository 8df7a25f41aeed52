//! In-memory remote tree. Stands in for a real server in tests and lets the
//! engine be exercised without a network.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    ConnectionSettings, Connector, RemoteListing, RemoteSession, SessionError, SessionErrorKind,
    SessionResult,
};
use crate::credentials::Credentials;
use crate::entry::EntryKind;
use crate::error::Error;
use crate::path_map::{join_remote, normalize_remote, parent_remote};

#[derive(Debug, Clone)]
enum MemoryNode {
    Dir {
        denied: bool,
    },
    File {
        data: Vec<u8>,
        reports_size: bool,
        fails_download: bool,
    },
}

/// A remote directory tree keyed by normalised absolute path.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: BTreeMap<String, MemoryNode>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), MemoryNode::Dir { denied: false });
        Self { nodes }
    }

    /// Adds a directory and any missing parents.
    pub fn dir(mut self, path: &str) -> Self {
        self.ensure_dir(&normalize_remote(path));
        self
    }

    /// A directory that is listed by its parent but cannot be entered.
    pub fn denied_dir(mut self, path: &str) -> Self {
        let path = normalize_remote(path);
        self.ensure_dir(&path);
        self.nodes.insert(path, MemoryNode::Dir { denied: true });
        self
    }

    pub fn file(self, path: &str, data: &[u8]) -> Self {
        self.insert_file(path, data, true, false)
    }

    /// A file whose size the server will not report.
    pub fn file_without_size(self, path: &str, data: &[u8]) -> Self {
        self.insert_file(path, data, false, false)
    }

    /// A file whose download breaks off halfway.
    pub fn failing_file(self, path: &str, data: &[u8]) -> Self {
        self.insert_file(path, data, true, true)
    }

    fn insert_file(mut self, path: &str, data: &[u8], reports_size: bool, fails_download: bool) -> Self {
        let path = normalize_remote(path);
        self.ensure_dir(&parent_remote(&path));
        self.nodes.insert(
            path,
            MemoryNode::File {
                data: data.to_vec(),
                reports_size,
                fails_download,
            },
        );
        self
    }

    fn ensure_dir(&mut self, path: &str) {
        if path != "/" {
            self.ensure_dir(&parent_remote(path));
        }
        self.nodes
            .entry(path.to_string())
            .or_insert(MemoryNode::Dir { denied: false });
    }

    fn children(&self, dir: &str) -> Vec<(String, &MemoryNode)> {
        self.nodes
            .iter()
            .filter(|(path, _)| path.as_str() != "/" && parent_remote(path) == dir)
            .filter_map(|(path, node)| {
                path.rsplit_once('/')
                    .map(|(_, name)| (name.to_string(), node))
            })
            .collect()
    }

    pub fn directory_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| matches!(n, MemoryNode::Dir { .. }))
            .count()
    }
}

/// Call counters shared by every session of one connector.
#[derive(Debug, Default)]
pub struct MemoryStats {
    pub connections: AtomicUsize,
    pub downloads: AtomicUsize,
    pub probes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MemoryStats {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MemoryConnector {
    tree: Arc<MemoryTree>,
    structured: bool,
    refuse: bool,
    /// Connection attempts allowed before every further one is refused.
    allowed: Option<usize>,
    attempts: AtomicUsize,
    password: Option<String>,
    stats: Arc<MemoryStats>,
}

impl MemoryConnector {
    /// Server without structured listings: names only.
    pub fn new(tree: MemoryTree) -> Self {
        Self {
            tree: Arc::new(tree),
            structured: false,
            refuse: false,
            allowed: None,
            attempts: AtomicUsize::new(0),
            password: None,
            stats: Arc::new(MemoryStats::default()),
        }
    }

    /// Server that answers MLSD.
    pub fn with_structured_listing(mut self) -> Self {
        self.structured = true;
        self
    }

    /// Every connection attempt fails.
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// The first `allowed` connection attempts succeed, later ones fail.
    pub fn refusing_after(mut self, allowed: usize) -> Self {
        self.allowed = Some(allowed);
        self
    }

    /// Logins must present this password.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn stats(&self) -> Arc<MemoryStats> {
        Arc::clone(&self.stats)
    }
}

impl Connector for MemoryConnector {
    type Session = MemorySession;

    fn connect(
        &self,
        settings: &ConnectionSettings,
        credentials: &Credentials,
    ) -> Result<MemorySession, Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse || self.allowed.map_or(false, |allowed| attempt >= allowed) {
            return Err(Error::Connection(format!(
                "cannot reach {}:{}: connection refused",
                settings.host, settings.port
            )));
        }
        if let Some(expected) = &self.password {
            if expected != &credentials.password {
                return Err(Error::Connection(format!(
                    "login as {} failed: 530 Login incorrect",
                    credentials.username
                )));
            }
        }
        self.stats.connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            tree: Arc::clone(&self.tree),
            cwd: "/".to_string(),
            structured: self.structured,
            stats: Arc::clone(&self.stats),
        })
    }
}

pub struct MemorySession {
    tree: Arc<MemoryTree>,
    cwd: String,
    structured: bool,
    stats: Arc<MemoryStats>,
}

impl MemorySession {
    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            normalize_remote(path)
        } else {
            normalize_remote(&join_remote(&self.cwd, path))
        }
    }

    fn file(&self, path: &str) -> SessionResult<(&Vec<u8>, bool, bool)> {
        match self.tree.nodes.get(&self.resolve(path)) {
            Some(MemoryNode::File {
                data,
                reports_size,
                fails_download,
            }) => Ok((data, *reports_size, *fails_download)),
            Some(MemoryNode::Dir { .. }) => Err(SessionError::new(
                SessionErrorKind::NotFound,
                format!("550 {}: Not a regular file", path),
            )),
            None => Err(SessionError::new(
                SessionErrorKind::NotFound,
                format!("550 {}: No such file or directory", path),
            )),
        }
    }
}

impl RemoteSession for MemorySession {
    fn change_dir(&mut self, path: &str) -> SessionResult<()> {
        self.stats.probes.fetch_add(1, Ordering::SeqCst);
        let target = self.resolve(path);
        match self.tree.nodes.get(&target) {
            Some(MemoryNode::Dir { denied: false }) => {
                self.cwd = target;
                Ok(())
            }
            Some(MemoryNode::Dir { denied: true }) => Err(SessionError::new(
                SessionErrorKind::PermissionDenied,
                format!("550 {}: Permission denied", path),
            )),
            Some(MemoryNode::File { .. }) => Err(SessionError::new(
                SessionErrorKind::NotFound,
                format!("550 {}: Not a directory", path),
            )),
            None => Err(SessionError::new(
                SessionErrorKind::NotFound,
                format!("550 {}: No such file or directory", path),
            )),
        }
    }

    fn current_dir(&mut self) -> SessionResult<String> {
        Ok(self.cwd.clone())
    }

    fn list_names(&mut self) -> SessionResult<Vec<String>> {
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(self.tree.children(&self.cwd).into_iter().map(|(name, _)| name));
        Ok(names)
    }

    fn list_detailed(&mut self) -> SessionResult<Option<Vec<RemoteListing>>> {
        if !self.structured {
            return Ok(None);
        }
        let listing = self
            .tree
            .children(&self.cwd)
            .into_iter()
            .map(|(name, node)| match node {
                MemoryNode::Dir { denied } => RemoteListing {
                    name,
                    kind: Some(EntryKind::Directory),
                    size: None,
                    perm: Some(if *denied { "l" } else { "flcdmpe" }.to_string()),
                },
                MemoryNode::File {
                    data, reports_size, ..
                } => RemoteListing {
                    name,
                    kind: Some(EntryKind::File),
                    size: reports_size.then_some(data.len() as u64),
                    perm: Some("adfrw".to_string()),
                },
            })
            .collect();
        Ok(Some(listing))
    }

    fn size_of(&mut self, path: &str) -> SessionResult<Option<u64>> {
        let (data, reports_size, _) = self.file(path)?;
        Ok(reports_size.then_some(data.len() as u64))
    }

    fn download_to(&mut self, path: &str, sink: &mut dyn Write) -> SessionResult<u64> {
        let (data, _, fails_download) = self.file(path)?;
        let data = data.clone();
        self.stats.downloads.fetch_add(1, Ordering::SeqCst);

        let io_err = |e: std::io::Error| SessionError::new(SessionErrorKind::Connection, e.to_string());
        if fails_download {
            sink.write_all(&data[..data.len() / 2]).map_err(io_err)?;
            return Err(SessionError::new(
                SessionErrorKind::Connection,
                format!("426 {}: Connection closed; transfer aborted", path),
            ));
        }
        sink.write_all(&data).map_err(io_err)?;
        Ok(data.len() as u64)
    }

    fn close(&mut self) -> SessionResult<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(tree: MemoryTree) -> MemorySession {
        let settings = ConnectionSettings {
            host: "memory".to_string(),
            port: 21,
            passive_mode: true,
        };
        let creds = Credentials {
            username: "anonymous".to_string(),
            password: String::new(),
        };
        MemoryConnector::new(tree)
            .with_structured_listing()
            .connect(&settings, &creds)
            .unwrap()
    }

    #[test]
    fn test_builder_creates_parents() {
        let tree = MemoryTree::new().file("/a/b/file1.txt", b"0123456789");
        assert_eq!(tree.directory_count(), 3);
    }

    #[test]
    fn test_navigation_and_listing() {
        let mut s = session(MemoryTree::new().file("/a/b/f.txt", b"x").dir("/a/c"));
        s.change_dir("/a").unwrap();
        assert_eq!(s.current_dir().unwrap(), "/a");
        assert_eq!(s.list_names().unwrap(), vec![".", "..", "b", "c"]);

        s.change_dir("b").unwrap();
        assert_eq!(s.current_dir().unwrap(), "/a/b");
        s.change_dir("..").unwrap();
        assert_eq!(s.current_dir().unwrap(), "/a");
    }

    #[test]
    fn test_denied_and_file_cwd_errors() {
        let mut s = session(MemoryTree::new().denied_dir("/secret").file("/f.txt", b"x"));
        let denied = s.change_dir("/secret").unwrap_err();
        assert_eq!(denied.kind, SessionErrorKind::PermissionDenied);
        let not_dir = s.change_dir("/f.txt").unwrap_err();
        assert_eq!(not_dir.kind, SessionErrorKind::NotFound);
        assert_eq!(s.current_dir().unwrap(), "/");
    }

    #[test]
    fn test_failing_download_writes_partial_bytes() {
        let mut s = session(MemoryTree::new().failing_file("/big.bin", &[7u8; 10]));
        let mut sink = Vec::new();
        assert!(s.download_to("/big.bin", &mut sink).is_err());
        assert_eq!(sink.len(), 5);
    }

    #[test]
    fn test_refusing_after_allows_first_connections() {
        let settings = ConnectionSettings {
            host: "memory".to_string(),
            port: 21,
            passive_mode: true,
        };
        let creds = Credentials {
            username: "anonymous".to_string(),
            password: String::new(),
        };
        let connector = MemoryConnector::new(MemoryTree::new()).refusing_after(1);
        assert!(connector.connect(&settings, &creds).is_ok());
        assert!(connector.connect(&settings, &creds).is_err());
        assert_eq!(connector.stats().connections(), 1);
    }
}
