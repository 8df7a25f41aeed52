use chrono::{DateTime, Local};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::credentials::{Credentials, SecretProvider};
use crate::entry::TreeEntry;
use crate::error::Error;
use crate::path_map::MirrorPaths;
use crate::progress::MirrorReporter;
use crate::remote::ftp::FtpConnector;
use crate::remote::{ConnectionSettings, Connector, RemoteSession};
use crate::report::{Failure, FailureKind, MirrorReport};
use crate::walker::{MirrorWalker, WalkOptions};

pub struct MirrorEngine<C: Connector> {
    config: MirrorConfig,
    connector: C,
}

#[derive(Debug)]
pub struct MirrorResult {
    pub report: MirrorReport,
    pub duration: Duration,
    pub started_at: DateTime<Local>,
    pub remote_base: String,
    pub local_base: PathBuf,
    pub dry_run: bool,
}

impl MirrorEngine<FtpConnector> {
    /// Engine talking to a real FTP server.
    pub fn ftp(config: MirrorConfig) -> Self {
        let connector = FtpConnector::new(config.listing_mode);
        Self::new(config, connector)
    }
}

impl<C: Connector> MirrorEngine<C> {
    pub fn new(config: MirrorConfig, connector: C) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Mirror the remote base into the local base.
    ///
    /// Only configuration, credential and initial connection problems are
    /// returned as errors. Everything that goes wrong inside the tree ends up
    /// in the report and the run carries on.
    pub fn mirror<P, R>(&self, secrets: &P, reporter: &R) -> Result<MirrorResult, Error>
    where
        P: SecretProvider + ?Sized,
        R: MirrorReporter + ?Sized,
    {
        self.run(secrets, reporter, false)
    }

    /// Walk and classify the remote tree without touching the local side.
    pub fn scan<P, R>(&self, secrets: &P, reporter: &R) -> Result<MirrorResult, Error>
    where
        P: SecretProvider + ?Sized,
        R: MirrorReporter + ?Sized,
    {
        self.run(secrets, reporter, true)
    }

    fn run<P, R>(&self, secrets: &P, reporter: &R, dry_run: bool) -> Result<MirrorResult, Error>
    where
        P: SecretProvider + ?Sized,
        R: MirrorReporter + ?Sized,
    {
        self.config.validate()?;
        let options = WalkOptions::from_config(&self.config, dry_run)?;
        let credentials = secrets.credentials(&self.config)?;
        let settings = ConnectionSettings::from(&self.config);

        let started_at = Local::now();
        let start = Instant::now();

        info!(
            "Connecting to {}:{} as {}",
            settings.host, settings.port, credentials.username
        );
        let mut session = self.connector.connect(&settings, &credentials)?;
        debug!("Connected in {:.2}s", start.elapsed().as_secs_f64());

        let paths = MirrorPaths::new(
            &self.config.remote_base_dir,
            &self.config.local_base_dir,
            self.config.sanitize_names,
        );

        // The session is closed on every path once connected.
        let walked = self.walk(&mut session, &settings, &credentials, &paths, &options, reporter);
        if let Err(e) = session.close() {
            warn!("Error closing connection: {}", e);
        }
        let report = walked?;

        let duration = start.elapsed();
        info!(
            "Mirror finished in {:.2}s: {} folders, {} files, {} errors",
            duration.as_secs_f64(),
            report.directories_created,
            report.files_transferred,
            report.error_count(),
        );
        reporter.on_mirror_complete(&report, duration);

        Ok(MirrorResult {
            report,
            duration,
            started_at,
            remote_base: paths.remote_base.clone(),
            local_base: paths.local_base.clone(),
            dry_run,
        })
    }

    fn walk<R: MirrorReporter + ?Sized>(
        &self,
        session: &mut C::Session,
        settings: &ConnectionSettings,
        credentials: &Credentials,
        paths: &MirrorPaths,
        options: &WalkOptions,
        reporter: &R,
    ) -> Result<MirrorReport, Error> {
        if !options.dry_run {
            fs::create_dir_all(&paths.local_base).map_err(|e| Error::LocalIo {
                path: paths.local_base.display().to_string(),
                source: e,
            })?;
        }

        reporter.on_mirror_start(&paths.remote_base, &paths.local_base);

        if self.config.workers > 1 {
            self.run_parallel(session, settings, credentials, paths, options, reporter)
        } else {
            Ok(MirrorWalker::new(paths, options, reporter).run(session))
        }
    }

    /// The primary session scans the base directory. Its subdirectories are
    /// then shared between `workers` threads, each holding its own connection.
    fn run_parallel<R: MirrorReporter + ?Sized>(
        &self,
        session: &mut C::Session,
        settings: &ConnectionSettings,
        credentials: &Credentials,
        paths: &MirrorPaths,
        options: &WalkOptions,
        reporter: &R,
    ) -> Result<MirrorReport, Error> {
        let mut root = MirrorWalker::new(paths, options, reporter).deferring_subdirectories();
        root.visit_root(session);
        let (mut report, subtrees) = root.finish();

        if subtrees.is_empty() {
            return Ok(report);
        }

        let workers = self.config.workers.min(subtrees.len());
        info!("Mirroring {} folders with {} workers", subtrees.len(), workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start {} workers: {}", workers, e)))?;

        let queue: Mutex<VecDeque<(usize, TreeEntry)>> =
            Mutex::new(subtrees.into_iter().enumerate().collect());
        let last_connect_error: Mutex<Option<String>> = Mutex::new(None);

        let mut finished: Vec<(usize, MirrorReport)> = pool.install(|| {
            (0..workers)
                .into_par_iter()
                .flat_map_iter(|worker| {
                    self.drain_queue(
                        worker,
                        &queue,
                        &last_connect_error,
                        settings,
                        credentials,
                        paths,
                        options,
                        reporter,
                    )
                })
                .collect()
        });

        // Subtrees nobody could connect for.
        let leftover: Vec<(usize, TreeEntry)> = match queue.into_inner() {
            Ok(queue) => queue.into_iter().collect(),
            Err(poisoned) => poisoned.into_inner().into_iter().collect(),
        };
        if !leftover.is_empty() {
            let message = last_connect_error
                .into_inner()
                .ok()
                .flatten()
                .unwrap_or_else(|| "no worker connection available".to_string());
            for (index, entry) in leftover {
                let mut walker = MirrorWalker::new(paths, options, reporter);
                walker.record_subtree_failure(&entry, Failure::new(FailureKind::Connection, message.clone()));
                finished.push((index, walker.finish().0));
            }
        }

        finished.sort_by_key(|(index, _)| *index);
        for (_, subtree) in finished {
            report.merge(subtree);
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn drain_queue<R: MirrorReporter + ?Sized>(
        &self,
        worker: usize,
        queue: &Mutex<VecDeque<(usize, TreeEntry)>>,
        last_connect_error: &Mutex<Option<String>>,
        settings: &ConnectionSettings,
        credentials: &Credentials,
        paths: &MirrorPaths,
        options: &WalkOptions,
        reporter: &R,
    ) -> Vec<(usize, MirrorReport)> {
        let mut session = match self.connector.connect(settings, credentials) {
            Ok(session) => session,
            Err(e) => {
                warn!("Worker {} cannot connect: {}", worker, e);
                if let Ok(mut slot) = last_connect_error.lock() {
                    *slot = Some(e.to_string());
                }
                return Vec::new();
            }
        };
        debug!("Worker {} connected", worker);

        let mut done = Vec::new();
        loop {
            let next = match queue.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => None,
            };
            let Some((index, entry)) = next else { break };

            let mut walker = MirrorWalker::new(paths, options, reporter);
            walker.visit_directory(&mut session, &entry);
            done.push((index, walker.finish().0));
        }

        if let Err(e) = session.close() {
            warn!("Worker {} error closing connection: {}", worker, e);
        }
        done
    }
}
