//! Single-instance guard for the bot poller.
//!
//! Two processes long-polling with the same bot token make the API answer
//! every `getUpdates` with a conflict. The instance lock prevents that at
//! startup: the record (owner PID, host, and working directory) is written
//! to a temporary file which is then moved into place without replacing an
//! existing lock, so the lock file never exists without a complete record.
//! A lock whose PID no longer exists, or names this very process, is stale
//! and is reclaimed.
//!
//! # Example
//!
//! ```no_run
//! use clank_core::instance_lock::{InstanceLock, LockError};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     match InstanceLock::acquire(".clank/bot-123.lock") {
//!         Ok(lock) => {
//!             // We're the only poller - run, then release on the way out
//!             lock.release()?;
//!         }
//!         Err(LockError::AlreadyRunning(existing)) => {
//!             eprintln!("Bot already running as PID {}", existing.pid);
//!         }
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tempfile::NamedTempFile;

/// Metadata stored in the lock file, readable by other processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Process ID of the lock holder.
    pub pid: u32,

    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,

    /// Host the holder runs on.
    pub hostname: String,

    /// Working directory of the holder.
    pub cwd: PathBuf,
}

impl LockRecord {
    fn for_current_process() -> Self {
        Self {
            pid: process::id(),
            started_at: Utc::now(),
            hostname: current_hostname(),
            cwd: std::env::current_dir().unwrap_or_default(),
        }
    }
}

/// Errors that can occur during lock operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock is held by a live process.
    #[error(
        "another instance is already running (PID {}, host {}, started {})",
        .0.pid, .0.hostname, .0.started_at
    )]
    AlreadyRunning(LockRecord),

    /// IO error during lock operations.
    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to encode lock metadata.
    #[error("failed to encode lock record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A held instance lock. The lock file is removed on [`release`](Self::release)
/// or when this value is dropped.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    record: LockRecord,
    released: bool,
}

impl InstanceLock {
    /// Acquire the lock at `path`, reclaiming it if its recorded PID is dead
    /// or is our own (a record left by an earlier process that reused it).
    ///
    /// # Returns
    ///
    /// * `Ok(InstanceLock)` - Lock acquired (fresh or reclaimed)
    /// * `Err(LockError::AlreadyRunning(record))` - A live process holds the lock
    /// * `Err(LockError::Io { .. })` - IO error
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(io_err)?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };

        let record = LockRecord::for_current_process();
        let body = serde_json::to_string_pretty(&record)?;

        // Second pass only happens after a stale lock was removed.
        for _ in 0..2 {
            let mut staged = NamedTempFile::new_in(&parent).map_err(io_err)?;
            staged.write_all(body.as_bytes()).map_err(io_err)?;
            staged.as_file().sync_all().map_err(io_err)?;

            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    tracing::debug!(path = %path.display(), pid = record.pid, "Acquired instance lock");
                    return Ok(Self {
                        path: path.clone(),
                        record,
                        released: false,
                    });
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    match Self::read_record(&path)? {
                        Some(existing)
                            if existing.pid != record.pid && pid_is_alive(existing.pid) =>
                        {
                            return Err(LockError::AlreadyRunning(existing));
                        }
                        existing => {
                            tracing::warn!(
                                path = %path.display(),
                                stale_pid = existing.map(|r| r.pid),
                                "Reclaiming stale instance lock"
                            );
                            match fs::remove_file(&path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                                Err(e) => return Err(io_err(e)),
                            }
                        }
                    }
                }
                Err(e) => return Err(io_err(e.error)),
            }
        }

        Err(io_err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "lock file reappeared while reclaiming a stale lock",
        )))
    }

    /// Read the record in an existing lock file.
    ///
    /// Returns `Ok(None)` when the file is missing or does not hold a record.
    pub fn read_record(path: impl AsRef<Path>) -> Result<Option<LockRecord>, LockError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents).ok()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Returns the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The record this process wrote.
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Delete the lock file.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // Only remove the file while it still carries our PID.
        match Self::read_record(&self.path)? {
            Some(current) if current.pid != self.record.pid => {
                tracing::warn!(
                    path = %self.path.display(),
                    owner = current.pid,
                    "Instance lock was taken over, leaving it in place"
                );
                Ok(())
            }
            _ => match fs::remove_file(&self.path) {
                Ok(()) => {
                    tracing::debug!("Released instance lock at {}", self.path.display());
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(LockError::Io {
                    path: self.path.clone(),
                    source,
                }),
            },
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!(error = %e, "Failed to release instance lock");
        }
    }
}

/// Probe whether `pid` names a running process (signal 0).
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but belongs to another user.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Without a signal probe every recorded PID is treated as live.
#[cfg(not(unix))]
pub fn pid_is_alive(_pid: u32) -> bool {
    true
}

fn current_hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
    }
}
