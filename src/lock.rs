//! Single-instance run lock.
//!
//! An advisory exclusive lock on a well-known file guarantees that at
//! most one update attempt runs at a time. Locking never blocks: a
//! periodic scheduler is expected to simply retry on its next cycle.
//! The lock is bound to the open file, thus it is released by the
//! kernel whenever the process exits, however that happens.

use fs2::FileExt;
use nix::fcntl::OFlag;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Default lock-file location.
pub(crate) static DEFAULT_LOCK_PATH: &str = "/var/run/autoupdater.lock";

#[derive(Debug, Fail)]
pub(crate) enum LockError {
    #[fail(display = "another instance is currently running")]
    AlreadyRunning,
    #[fail(display = "unable to open lock file '{}'", _0)]
    Open(String, #[cause] io::Error),
    #[fail(display = "unable to lock '{}'", _0)]
    Lock(String, #[cause] io::Error),
}

/// Held run lock.
#[derive(Debug)]
pub(crate) struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    /// Try to take the run lock, failing immediately on contention.
    pub(crate) fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, LockError> {
        let path = path.as_ref();
        // Read-only, as flock needs no write access.
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_CREAT.bits())
            .mode(0o666)
            .open(path)
            .map_err(|e| LockError::Open(path.display().to_string(), e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(LockError::AlreadyRunning);
            }
            return Err(LockError::Lock(path.display().to_string(), e));
        }

        debug!("acquired run lock '{}'", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        trace!("releasing run lock '{}'", self.path.display());
    }
}
