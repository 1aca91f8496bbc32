//! Persisted worker status, readable by any process that knows the path.
//!
//! There is one writer (the worker) and many readers. Writes go to a sibling
//! temp file and are renamed over the record, so readers see either the old
//! or the new value. There is no locking.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SocketWorkerError};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketWorkerStatus {
    /// Set before the socket is bound.
    Starting,
    /// Idle between accept cycles.
    Ready,
    /// Blocked in accept, waiting for a dispatcher.
    Waiting,
    /// Handling a connection.
    Busy,
}

impl fmt::Display for SocketWorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketWorkerStatus::Starting => write!(f, "starting"),
            SocketWorkerStatus::Ready => write!(f, "ready"),
            SocketWorkerStatus::Waiting => write!(f, "waiting"),
            SocketWorkerStatus::Busy => write!(f, "busy"),
        }
    }
}

impl FromStr for SocketWorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "starting" => Ok(SocketWorkerStatus::Starting),
            "ready" => Ok(SocketWorkerStatus::Ready),
            "waiting" => Ok(SocketWorkerStatus::Waiting),
            "busy" => Ok(SocketWorkerStatus::Busy),
            _ => Err(format!("unknown worker status: {s}")),
        }
    }
}

/// On-disk layout of the status cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: SocketWorkerStatus,

    /// Process id of the writing worker.
    pub pid: u32,

    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    fn now(status: SocketWorkerStatus) -> Self {
        Self {
            status,
            pid: std::process::id(),
            updated_at: Utc::now(),
        }
    }
}

/// Handle on a status record at a fixed path.
///
/// Records are written owner-only (`0600`), as is the worker socket. Readers
/// running under another uid get a permission error from [`get`](Self::get)
/// and cannot connect, so worker and dispatchers must share a user.
#[derive(Debug, Clone)]
pub struct StatusCell {
    path: PathBuf,
}

impl StatusCell {
    /// Create (or overwrite) the record with `initial`.
    pub fn create(path: impl Into<PathBuf>, initial: SocketWorkerStatus) -> Result<Self> {
        let cell = Self { path: path.into() };
        if let Some(parent) = cell.path.parent() {
            fs::create_dir_all(parent).map_err(|e| cell.error(e))?;
        }
        cell.write_record(&StatusRecord::now(initial))?;
        Ok(cell)
    }

    /// Attach to a record without touching it. The record may not exist.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Current status, or `None` if the record does not exist.
    pub fn get(&self) -> Result<Option<SocketWorkerStatus>> {
        Ok(self.record()?.map(|r| r.status))
    }

    /// Full record, or `None` if it does not exist.
    pub fn record(&self) -> Result<Option<StatusRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_str(contents.trim())
            .map(Some)
            .map_err(|e| self.error(format!("malformed record: {}", e)))
    }

    /// Overwrite the status. Does nothing if the record has been removed.
    pub fn set(&self, status: SocketWorkerStatus) -> Result<()> {
        if !self.exists() {
            tracing::debug!(
                path = %self.path.display(),
                %status,
                "status record missing, update dropped"
            );
            return Ok(());
        }
        self.write_record(&StatusRecord::now(status))?;
        tracing::debug!(path = %self.path.display(), %status, "status updated");
        Ok(())
    }

    /// Delete the record. Missing records are not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }

    fn write_record(&self, record: &StatusRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| self.error(e))?;
            file.write_all(json.as_bytes()).map_err(|e| self.error(e))?;
            file.sync_all().map_err(|e| self.error(e))?;
        }
        set_file_permissions_0600(&tmp_path);
        fs::rename(&tmp_path, &self.path).map_err(|e| self.error(e))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn error(&self, reason: impl fmt::Display) -> SocketWorkerError {
        SocketWorkerError::Status {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Default status path for a socket: the socket path with `.status` appended.
pub fn default_status_path(socket_path: &Path) -> PathBuf {
    let mut name = socket_path.as_os_str().to_owned();
    name.push(".status");
    PathBuf::from(name)
}

#[cfg(unix)]
pub(crate) fn set_file_permissions_0600(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    if let Err(e) = fs::set_permissions(path, perms) {
        tracing::warn!(path = %path.display(), error = %e, "could not restrict permissions");
    }
}

#[cfg(not(unix))]
pub(crate) fn set_file_permissions_0600(_path: &Path) {}
