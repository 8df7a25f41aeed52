//! FTP session over `suppaftp`.

use std::io::{self, Read, Write};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, Status};
use tracing::{debug, info, warn};

use super::listing::parse_mlsd;
use super::{
    ConnectionSettings, Connector, RemoteListing, RemoteSession, SessionError, SessionErrorKind,
    SessionResult,
};
use crate::config::ListingMode;
use crate::credentials::Credentials;
use crate::error::Error;

pub struct FtpConnector {
    listing_mode: ListingMode,
}

impl FtpConnector {
    pub fn new(listing_mode: ListingMode) -> Self {
        Self { listing_mode }
    }
}

impl Connector for FtpConnector {
    type Session = FtpSession;

    fn connect(
        &self,
        settings: &ConnectionSettings,
        credentials: &Credentials,
    ) -> Result<FtpSession, Error> {
        let address = format!("{}:{}", settings.host, settings.port);
        info!("Connecting to {}...", address);

        let mut stream = FtpStream::connect(address.as_str())
            .map_err(|e| Error::Connection(format!("cannot reach {}: {}", address, e)))?;
        stream
            .login(credentials.username.as_str(), credentials.password.as_str())
            .map_err(|e| {
                Error::Connection(format!("login as {} failed: {}", credentials.username, e))
            })?;

        stream.set_mode(if settings.passive_mode {
            Mode::Passive
        } else {
            Mode::Active
        });
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| Error::Connection(format!("cannot switch to binary mode: {}", e)))?;

        info!("Connected to {} as {}", address, credentials.username);

        Ok(FtpSession {
            stream,
            mlsd_supported: self.listing_mode != ListingMode::Nlst,
            listing_mode: self.listing_mode,
        })
    }
}

pub struct FtpSession {
    stream: FtpStream,
    /// Cleared after the first "not implemented" reply to MLSD.
    mlsd_supported: bool,
    listing_mode: ListingMode,
}

impl RemoteSession for FtpSession {
    fn change_dir(&mut self, path: &str) -> SessionResult<()> {
        self.stream.cwd(path).map_err(map_ftp_error)
    }

    fn current_dir(&mut self) -> SessionResult<String> {
        self.stream.pwd().map_err(map_ftp_error)
    }

    fn list_names(&mut self) -> SessionResult<Vec<String>> {
        let names = self.stream.nlst(None).map_err(map_ftp_error)?;
        // Some servers answer NLST with paths rather than leaf names.
        Ok(names
            .into_iter()
            .map(|n| match n.rsplit_once('/') {
                Some((_, leaf)) if !leaf.is_empty() => leaf.to_string(),
                _ => n,
            })
            .collect())
    }

    fn list_detailed(&mut self) -> SessionResult<Option<Vec<RemoteListing>>> {
        if !self.mlsd_supported {
            return Ok(None);
        }

        let lines = self.stream.mlsd(None).map_err(map_ftp_error);
        structured_listing(lines, self.listing_mode, &mut self.mlsd_supported)
    }

    fn size_of(&mut self, path: &str) -> SessionResult<Option<u64>> {
        match self.stream.size(path) {
            Ok(size) => Ok(Some(size as u64)),
            Err(e) => {
                debug!("SIZE {} failed: {}", path, e);
                Ok(None)
            }
        }
    }

    fn download_to(&mut self, path: &str, sink: &mut dyn Write) -> SessionResult<u64> {
        self.stream
            .retr(path, |reader: &mut dyn Read| {
                io::copy(reader, &mut *sink).map_err(FtpError::ConnectionError)
            })
            .map_err(map_ftp_error)
    }

    fn close(&mut self) -> SessionResult<()> {
        self.stream.quit().map_err(map_ftp_error)
    }
}

/// Turns an MLSD reply into a listing. In `auto` mode a server that does not
/// know the command switches the session to name listings for good.
fn structured_listing(
    lines: SessionResult<Vec<String>>,
    mode: ListingMode,
    mlsd_supported: &mut bool,
) -> SessionResult<Option<Vec<RemoteListing>>> {
    match lines {
        Ok(lines) => Ok(Some(parse_mlsd(&lines))),
        Err(err) if err.kind == SessionErrorKind::Unsupported && mode == ListingMode::Auto => {
            warn!("Server does not support MLSD, falling back to NLST: {}", err);
            *mlsd_supported = false;
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn map_ftp_error(err: FtpError) -> SessionError {
    match err {
        FtpError::ConnectionError(e) => SessionError::new(SessionErrorKind::Connection, e.to_string()),
        FtpError::UnexpectedResponse(ref response) => {
            let message = err.to_string();
            SessionError::new(classify_reply(&response.status, &message), message)
        }
        other => SessionError::new(SessionErrorKind::Protocol, other.to_string()),
    }
}

fn classify_reply(status: &Status, body: &str) -> SessionErrorKind {
    match status {
        Status::NotLoggedIn => SessionErrorKind::PermissionDenied,
        Status::FileUnavailable if mentions_permission(body) => SessionErrorKind::PermissionDenied,
        Status::FileUnavailable => SessionErrorKind::NotFound,
        Status::BadCommand | Status::NotImplemented | Status::NotImplementedParameter => {
            SessionErrorKind::Unsupported
        }
        _ => SessionErrorKind::Protocol,
    }
}

fn mentions_permission(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["permission", "denied", "access"]
        .iter()
        .any(|needle| lower.contains(needle))
}
