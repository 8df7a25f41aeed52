//! Remote side of a mirror: the session collaborator and its implementations.

pub mod ftp;
pub mod listing;
pub mod memory;

use std::io::Write;
use thiserror::Error;

use crate::config::MirrorConfig;
use crate::credentials::Credentials;
use crate::entry::EntryKind;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    NotFound,
    PermissionDenied,
    Unsupported,
    Connection,
    Protocol,
}

#[derive(Error, Debug)]
#[error("{message}")]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        self.kind == SessionErrorKind::PermissionDenied
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListing {
    pub name: String,
    /// Known only when the server returned structured metadata.
    pub kind: Option<EntryKind>,
    pub size: Option<u64>,
    /// RFC 3659 `perm` fact, e.g. `el` for an enterable, listable directory.
    pub perm: Option<String>,
}

impl RemoteListing {
    pub fn name_only(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            size: None,
            perm: None,
        }
    }
}

/// Host and transfer settings needed to open a session.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub passive_mode: bool,
}

impl From<&MirrorConfig> for ConnectionSettings {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            passive_mode: config.passive_mode,
        }
    }
}

/// An authenticated connection exposing navigation and transfer.
///
/// Working-directory state belongs to the connection, so a session is never
/// shared between threads.
pub trait RemoteSession {
    fn change_dir(&mut self, path: &str) -> SessionResult<()>;

    fn current_dir(&mut self) -> SessionResult<String>;

    /// Names in the current directory.
    fn list_names(&mut self) -> SessionResult<Vec<String>>;

    /// Structured listing of the current directory, or `None` when the remote
    /// side has no such facility.
    fn list_detailed(&mut self) -> SessionResult<Option<Vec<RemoteListing>>>;

    fn size_of(&mut self, path: &str) -> SessionResult<Option<u64>>;

    /// Streams the remote file into `sink`, returning the number of bytes written.
    fn download_to(&mut self, path: &str, sink: &mut dyn Write) -> SessionResult<u64>;

    fn close(&mut self) -> SessionResult<()>;
}

pub trait Connector: Sync {
    type Session: RemoteSession;

    fn connect(
        &self,
        settings: &ConnectionSettings,
        credentials: &Credentials,
    ) -> Result<Self::Session, Error>;
}
