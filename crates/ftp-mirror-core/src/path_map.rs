//! Remote-to-local path translation.

use std::path::{Path, PathBuf};

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Strips `remote_base` from `remote_path` and joins the remainder onto
/// `local_base`.
///
/// When `remote_path` does not start with `remote_base` it is joined
/// unchanged (minus one leading `/`). Both paths should go through
/// [`normalize_remote`] first, otherwise `..` segments can escape `local_base`.
pub fn map(remote_base: &str, remote_path: &str, local_base: &Path) -> PathBuf {
    let mut local = local_base.to_path_buf();
    for part in relative_parts(remote_base, remote_path) {
        local.push(part);
    }
    local
}

fn relative_parts<'a>(remote_base: &str, remote_path: &'a str) -> impl Iterator<Item = &'a str> {
    let base = remote_base.trim_end_matches('/');
    let relative = remote_path.strip_prefix(base).unwrap_or(remote_path);
    let relative = relative.strip_prefix('/').unwrap_or(relative);
    relative.split('/').filter(|p| !p.is_empty())
}

/// Absolute, `/`-separated form with `.` and `..` resolved and repeated
/// separators collapsed. `..` never climbs above the root.
pub fn normalize_remote(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for component in replaced.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(c),
        }
    }
    format!("/{}", parts.join("/"))
}

pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent of a normalised remote path; the root is its own parent.
pub fn parent_remote(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// Makes a single remote name safe to create on Windows and Unix filesystems.
pub fn sanitize_component(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let keep = out.trim_end_matches(['.', ' ']).len();
    out.truncate(keep);
    if out.is_empty() {
        return "_".to_string();
    }

    let stem_len = out.find('.').unwrap_or(out.len());
    if RESERVED_NAMES.contains(&out[..stem_len].to_ascii_uppercase().as_str()) {
        out.insert(stem_len, '_');
    }
    out
}

/// The remote and local roots of one mirror run.
#[derive(Debug, Clone)]
pub struct MirrorPaths {
    pub remote_base: String,
    pub local_base: PathBuf,
    pub sanitize: bool,
}

impl MirrorPaths {
    pub fn new(remote_base: &str, local_base: &Path, sanitize: bool) -> Self {
        Self {
            remote_base: normalize_remote(remote_base),
            local_base: local_base.to_path_buf(),
            sanitize,
        }
    }

    /// Local counterpart of a normalised remote path.
    pub fn local_path_for(&self, remote_path: &str) -> PathBuf {
        if !self.sanitize {
            return map(&self.remote_base, remote_path, &self.local_base);
        }
        let mut local = self.local_base.clone();
        for part in relative_parts(&self.remote_base, remote_path) {
            local.push(sanitize_component(part));
        }
        local
    }
}
