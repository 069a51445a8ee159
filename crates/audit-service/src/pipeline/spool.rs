//! Fallback sink for events the store refused
//!
//! [`FileSpool`] appends one JSON document per line. Spooled events are
//! re-appended later with [`FileSpool::replay`], typically from the
//! `audit-admin replay-spool` command.
//!
//! Replay first moves the spool to a `<path>.replaying` sidecar and only
//! removes the sidecar once every line has been persisted, written back to
//! the spool, or moved to the `<path>.rejected` quarantine file. A replay
//! interrupted by a crash is picked up again on the next run, so spooled
//! events are delivered at least once.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use audit_core::entities::NewAuditEvent;
use audit_core::traits::AuditStore;

const REPLAYING_SUFFIX: &str = ".replaying";
const REJECTED_SUFFIX: &str = ".rejected";

/// Spool errors
#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("Spool I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spool serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Spool task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Last-resort destination for events that could not be persisted
#[async_trait]
pub trait FallbackSink: Send + Sync {
    async fn spool(&self, event: &NewAuditEvent) -> Result<(), SpoolError>;
}

/// JSON-lines file spool; clones share the same files
#[derive(Debug, Clone)]
pub struct FileSpool {
    files: Arc<SpoolFiles>,
}

#[derive(Debug)]
struct SpoolFiles {
    path: PathBuf,
    replaying: PathBuf,
    rejected: PathBuf,
    lock: Mutex<()>,
}

/// Outcome of a replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replayed: u64,
    /// Still failing; kept in the spool
    pub failed: u64,
    /// Lines that could not be parsed; moved to the quarantine file
    pub malformed: u64,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn read_lines(path: &Path) -> Result<Vec<String>, SpoolError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    BufReader::new(file)
        .lines()
        .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(SpoolError::from)
}

/// Append `lines` to `path` and sync them to disk
fn append_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<(), SpoolError> {
    if lines.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        writeln!(file, "{}", line.as_ref())?;
    }
    file.sync_data()?;
    Ok(())
}

impl SpoolFiles {
    fn append(&self, line: &str) -> Result<(), SpoolError> {
        let _guard = self.lock.lock();
        append_lines(&self.path, &[line])
    }

    fn pending(&self) -> Result<usize, SpoolError> {
        let _guard = self.lock.lock();
        Ok(read_lines(&self.replaying)?.len() + read_lines(&self.path)?.len())
    }

    /// Move the spool into the sidecar and return everything pending replay
    ///
    /// A sidecar left by an interrupted replay is kept and extended.
    fn begin_replay(&self) -> Result<Vec<String>, SpoolError> {
        let _guard = self.lock.lock();
        if self.path.exists() {
            if self.replaying.exists() {
                append_lines(&self.replaying, &read_lines(&self.path)?)?;
                fs::remove_file(&self.path)?;
            } else {
                fs::rename(&self.path, &self.replaying)?;
            }
        }
        read_lines(&self.replaying)
    }

    /// Write back what is still pending, then drop the sidecar
    fn finish_replay(&self, retained: &[String], malformed: &[String]) -> Result<(), SpoolError> {
        let _guard = self.lock.lock();
        append_lines(&self.rejected, malformed)?;
        append_lines(&self.path, retained)?;
        match fs::remove_file(&self.replaying) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl FileSpool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            files: Arc::new(SpoolFiles {
                replaying: with_suffix(&path, REPLAYING_SUFFIX),
                rejected: with_suffix(&path, REJECTED_SUFFIX),
                path,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.files.path
    }

    /// File receiving lines that could not be parsed during replay
    pub fn quarantine_path(&self) -> &Path {
        &self.files.rejected
    }

    /// Number of lines waiting to be replayed
    pub fn len(&self) -> Result<usize, SpoolError> {
        self.files.pending()
    }

    pub fn is_empty(&self) -> Result<bool, SpoolError> {
        Ok(self.len()? == 0)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, SpoolError>
    where
        T: Send + 'static,
        F: FnOnce(&SpoolFiles) -> Result<T, SpoolError> + Send + 'static,
    {
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || op(&files)).await?
    }

    /// Re-append every spooled event to `store`
    ///
    /// Events that fail again stay in the spool and unparseable lines go to
    /// [`quarantine_path`](Self::quarantine_path).
    pub async fn replay(&self, store: &dyn AuditStore) -> Result<ReplayReport, SpoolError> {
        let lines = self.blocking(SpoolFiles::begin_replay).await?;

        let mut report = ReplayReport::default();
        let mut retained = Vec::new();
        let mut malformed = Vec::new();
        for line in lines {
            let event: NewAuditEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Quarantining malformed spool line");
                    report.malformed += 1;
                    malformed.push(line);
                    continue;
                }
            };
            match store.append(event).await {
                Ok(_) => report.replayed += 1,
                Err(e) => {
                    warn!(error = %e, "Spooled event still cannot be persisted");
                    report.failed += 1;
                    retained.push(line);
                }
            }
        }

        self.blocking(move |files| files.finish_replay(&retained, &malformed))
            .await?;

        info!(
            path = %self.path().display(),
            replayed = report.replayed,
            failed = report.failed,
            malformed = report.malformed,
            "Spool replay finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl FallbackSink for FileSpool {
    async fn spool(&self, event: &NewAuditEvent) -> Result<(), SpoolError> {
        let line = serde_json::to_string(event)?;
        self.blocking(move |files| files.append(&line)).await
    }
}
