//! Single-instance lock on `<root>/.stagefmt/daemon.lock`.
//!
//! Acquisition is an exclusive, non-blocking `flock`. Losing the race is not
//! an error: [`LockAttempt::Held`] tells the caller another daemon owns the
//! repository, and the lock file is left exactly as it was.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{io_err, DaemonError};
use crate::record::DaemonRecord;

/// Attempts before giving up when the file keeps being replaced under us.
const ACQUIRE_ATTEMPTS: usize = 3;

pub enum LockAttempt {
    Acquired(DaemonLock),
    Held,
}

/// An exclusively locked lock file. Released on [`DaemonLock::release`] or
/// drop; either way the file is deleted before the lock is dropped.
pub struct DaemonLock {
    path: PathBuf,
    file: Option<Flock<File>>,
}

impl DaemonLock {
    pub fn acquire(path: &Path) -> Result<LockAttempt, DaemonError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        for _ in 0..ACQUIRE_ATTEMPTS {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)
                .map_err(|e| io_err(path, e))?;

            let locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(locked) => locked,
                Err((_, Errno::EWOULDBLOCK)) => return Ok(LockAttempt::Held),
                Err((_, source)) => {
                    return Err(DaemonError::Lock {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            };

            // A previous owner deletes the file before unlocking it; holding a
            // lock on an unlinked inode would not exclude anyone.
            if still_linked(path, &locked) {
                return Ok(LockAttempt::Acquired(Self {
                    path: path.to_path_buf(),
                    file: Some(locked),
                }));
            }
            tracing::debug!(path = %path.display(), "lock file replaced while locking; retrying");
        }
        Ok(LockAttempt::Held)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file content with `record`.
    pub fn write_record(&mut self, record: &DaemonRecord) -> Result<(), DaemonError> {
        let path = self.path.clone();
        let Some(file) = self.file.as_mut() else {
            return Err(DaemonError::Protocol(format!(
                "lock on {} already released",
                path.display()
            )));
        };
        let file: &mut File = file;
        file.set_len(0).map_err(|e| io_err(&path, e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| io_err(&path, e))?;
        file.write_all(record.to_string().as_bytes())
            .map_err(|e| io_err(&path, e))?;
        file.sync_all().map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Delete the lock file, then unlock and close it. Idempotent.
    pub fn release(&mut self) -> Result<(), DaemonError> {
        let Some(locked) = self.file.take() else {
            return Ok(());
        };
        let removed = match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&self.path, err)),
        };
        locked.unlock().map_err(|(_, source)| DaemonError::Lock {
            path: self.path.clone(),
            source,
        })?;
        removed
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(error = %err, "failed to release daemon lock");
        }
    }
}

fn still_linked(path: &Path, file: &File) -> bool {
    match (fs::metadata(path), file.metadata()) {
        (Ok(on_disk), Ok(held)) => on_disk.dev() == held.dev() && on_disk.ino() == held.ino(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::read_record;
    use tempfile::TempDir;

    fn acquire(path: &Path) -> DaemonLock {
        match DaemonLock::acquire(path).unwrap() {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Held => panic!("lock unexpectedly held"),
        }
    }

    #[test]
    fn second_acquire_reports_held_without_touching_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".stagefmt/daemon.lock");
        let mut first = acquire(&path);
        first
            .write_record(&DaemonRecord { version: 1, port: 4321 })
            .unwrap();

        assert!(matches!(DaemonLock::acquire(&path).unwrap(), LockAttempt::Held));
        assert_eq!(
            read_record(&path).unwrap(),
            Some(DaemonRecord { version: 1, port: 4321 })
        );
    }

    #[test]
    fn release_deletes_file_and_frees_lock() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("daemon.lock");
        let mut lock = acquire(&path);
        lock.release().unwrap();
        lock.release().unwrap();

        assert!(!path.exists());
        let _again = acquire(&path);
    }

    #[test]
    fn drop_releases() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("daemon.lock");
        drop(acquire(&path));
        assert!(!path.exists());
    }

    #[test]
    fn rewriting_record_truncates_previous_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("daemon.lock");
        std::fs::write(&path, "1 65000 trailing garbage").unwrap();
        let mut lock = acquire(&path);
        lock.write_record(&DaemonRecord { version: 2, port: 80 }).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2 80");
    }
}
