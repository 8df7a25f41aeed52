use indicatif::HumanBytes;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::entry::TreeEntry;
use crate::error::Error;
use crate::progress::MirrorReporter;
use crate::remote::RemoteSession;
use crate::report::{Failure, NodeStatus, SkipReason};

/// Prefix of the staging files written next to their final location.
pub const STAGING_PREFIX: &str = ".ftp-mirror-";

/// Downloads single files into the local mirror.
#[derive(Debug, Clone, Copy)]
pub struct TransferExecutor {
    pub skip_existing: bool,
}

impl TransferExecutor {
    pub fn new(skip_existing: bool) -> Self {
        Self { skip_existing }
    }

    /// Transfers `entry` to `local_path`. Never fails the caller: every
    /// problem comes back as a [`NodeStatus::Failed`] and nothing is left
    /// behind under the final name.
    pub fn execute<S, R>(
        &self,
        session: &mut S,
        entry: &TreeEntry,
        local_path: &Path,
        reporter: &R,
    ) -> NodeStatus
    where
        S: RemoteSession + ?Sized,
        R: MirrorReporter + ?Sized,
    {
        if self.skip_existing && local_path.exists() {
            info!("{}[SKIP] already exists: {}", entry.indent(), local_path.display());
            return NodeStatus::Skipped(SkipReason::Existing);
        }

        let size = entry
            .size
            .or_else(|| session.size_of(&entry.path).ok().flatten());
        reporter.on_transfer_start(entry, size);
        info!("{}Downloading {} ({})", entry.indent(), entry.name, format_size(size));

        match download(session, entry, local_path, size) {
            Ok(bytes) => NodeStatus::Transferred { bytes },
            Err(err) => {
                warn!("{}Failed {}: {}", entry.indent(), entry.path, err);
                NodeStatus::Failed(Failure::from(&err))
            }
        }
    }
}

/// Stages the download in a uniquely named file beside `local_path` and
/// moves it into place once complete. The staging file is removed on every
/// error path when it is dropped.
fn download<S: RemoteSession + ?Sized>(
    session: &mut S,
    entry: &TreeEntry,
    local_path: &Path,
    expected: Option<u64>,
) -> Result<u64, Error> {
    let dir = match local_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| local_error(dir, e))?;

    let staging_path = staging.path().to_path_buf();
    let bytes = fetch_into(session, &entry.path, &mut staging, &staging_path)?;

    if let Some(expected) = expected {
        if bytes != expected {
            return Err(Error::Transfer {
                path: entry.path.clone(),
                message: format!("received {} of {} bytes", bytes, expected),
            });
        }
    }

    staging
        .persist(local_path)
        .map_err(|e| local_error(local_path, e.error))?;
    Ok(bytes)
}

/// Streams `remote_path` into `sink`. A failure writing to `sink` is a local
/// error even though the session only sees a broken transfer.
pub(crate) fn fetch_into<S, W>(
    session: &mut S,
    remote_path: &str,
    sink: W,
    sink_name: &Path,
) -> Result<u64, Error>
where
    S: RemoteSession + ?Sized,
    W: Write,
{
    let mut writer = RecordingWriter::new(BufWriter::new(sink));
    let result = session.download_to(remote_path, &mut writer);

    if let Some(e) = writer.take_error() {
        return Err(local_error(sink_name, e));
    }
    let bytes = result.map_err(|e| Error::Transfer {
        path: remote_path.to_string(),
        message: e.to_string(),
    })?;
    writer.flush().map_err(|e| local_error(sink_name, e))?;
    Ok(bytes)
}

fn local_error(path: &Path, source: io::Error) -> Error {
    Error::LocalIo {
        path: path.display().to_string(),
        source,
    }
}

/// Keeps the first error raised by the inner writer.
struct RecordingWriter<W: Write> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> RecordingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn remember<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if self.error.is_none() {
                self.error = Some(io::Error::new(e.kind(), e.to_string()));
            }
        }
        result
    }
}

impl<W: Write> Write for RecordingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        self.remember(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.inner.flush();
        self.remember(result)
    }
}

pub fn format_size(size: Option<u64>) -> String {
    match size {
        Some(bytes) => HumanBytes(bytes).to_string(),
        None => "unknown size".to_string(),
    }
}
