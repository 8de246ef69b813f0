//! Writer lock for a password file, using flock(2) on a sidecar file.
//!
//! Only upserts take this lock; readers never wait on it.

use crate::constants;
use crate::error::{describe_io, StoreError};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// An exclusive lock. Released on drop (file close releases flock).
pub struct FileLock {
    _file: File,
}

/// Sidecar lock path for `target`: the same path with `.lock` appended.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(constants::LOCK_SUFFIX);
    PathBuf::from(name)
}

impl FileLock {
    /// Try to acquire the lock without blocking.
    /// Returns `Ok(Some(lock))` if acquired, `Ok(None)` if already held.
    pub fn try_exclusive(lock_path: &Path) -> io::Result<Option<Self>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            // fs2 on Linux may return Other instead of WouldBlock
            Err(ref e) if e.raw_os_error() == Some(11) => Ok(None), // EAGAIN
            Err(e) => Err(e),
        }
    }

    /// Poll for the lock at `lock_path` until `timeout` elapses.
    /// Returns `Ok(None)` if it was still held at the deadline.
    pub fn wait_exclusive(lock_path: &Path, timeout: Duration) -> io::Result<Option<Self>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = Self::try_exclusive(lock_path)? {
                return Ok(Some(lock));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(constants::LOCK_POLL_INTERVAL);
        }
    }

    /// Acquire the writer lock for password file `target`, giving up after `timeout`.
    pub fn for_writer(target: &Path, timeout: Duration) -> Result<Self, StoreError> {
        match Self::wait_exclusive(&lock_path_for(target), timeout) {
            Ok(Some(lock)) => Ok(lock),
            Ok(None) => Err(StoreError::persist(
                target,
                format!("timed out after {:?} waiting for writer lock", timeout),
            )),
            Err(e) => Err(StoreError::persist(
                target,
                format!("cannot open writer lock: {}", describe_io(&e)),
            )),
        }
    }
}
