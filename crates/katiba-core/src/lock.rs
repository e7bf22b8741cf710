use crate::error::{ErrorCode, KatibaError};
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Failure to take the build lock of an index location.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("build lock {} still held after {waited:?}", path.display())]
    Timeout { path: PathBuf, waited: Duration },
    #[error("build lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Io { .. } => ErrorCode::IndexUnavailable,
        }
    }
}

impl From<LockError> for KatibaError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { waited, .. } => Self::Timeout {
                operation: "index build lock",
                waited,
            },
            LockError::Io { path, source } => Self::IndexUnavailable {
                location: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                reason: format!("build lock: {source}"),
            },
        }
    }
}

/// RAII guard for the exclusive lock held while an index location is built.
///
/// Only one process may build a given location at a time; readers of a
/// published index never take this lock.
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Acquire an exclusive advisory lock on `path`, polling until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when another holder keeps the lock past
    /// `timeout`, or [`LockError::Io`] if the lock file cannot be created.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        let start = Instant::now();
        while file.try_lock_exclusive().is_err() {
            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Release now instead of at drop.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
