use tracing::debug;

use crate::entry::EntryKind;
use crate::remote::{RemoteListing, RemoteSession};

/// Result of deciding whether a listed entry can be traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryProbe {
    Directory,
    File,
    /// A directory the session is not allowed to enter.
    AccessDenied,
}

/// Classifies `listing`, found at the absolute remote `path`.
///
/// Structured metadata is trusted when present: a directory whose `perm`
/// fact lacks `e` cannot be entered. Without metadata the entry is probed by
/// changing into it and back. A refusal the server labels as a permission
/// problem is reported as [`DirectoryProbe::AccessDenied`]; every other
/// failure reads as a file, so an inaccessible directory on a server that
/// gives no reason is still indistinguishable from a file.
pub fn classify<S: RemoteSession + ?Sized>(
    session: &mut S,
    path: &str,
    listing: &RemoteListing,
) -> DirectoryProbe {
    match listing.kind {
        Some(EntryKind::File) => DirectoryProbe::File,
        Some(EntryKind::Directory) => match &listing.perm {
            Some(perm) if !perm.contains('e') => DirectoryProbe::AccessDenied,
            _ => DirectoryProbe::Directory,
        },
        None => probe_by_cwd(session, path),
    }
}

/// Enter `path` and come back to wherever the session was.
pub fn probe_by_cwd<S: RemoteSession + ?Sized>(session: &mut S, path: &str) -> DirectoryProbe {
    let original = match session.current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            debug!("Cannot read current directory before probing {}: {}", path, e);
            return DirectoryProbe::File;
        }
    };

    match session.change_dir(path) {
        Ok(()) => {
            if let Err(e) = session.change_dir(&original) {
                debug!("Cannot return to {} after probing {}: {}", original, path, e);
            }
            DirectoryProbe::Directory
        }
        Err(e) if e.is_permission_denied() => {
            debug!("Probe of {} refused: {}", path, e);
            DirectoryProbe::AccessDenied
        }
        Err(e) => {
            debug!("Probe of {} failed, treating as file: {}", path, e);
            DirectoryProbe::File
        }
    }
}
