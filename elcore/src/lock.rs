//! Process-exclusive advisory lock guarding `RawSampler` instances.
//!
//! A single well-known lock file is opened (creating it if absent), an
//! exclusive OS-level advisory lock ([`fs2::FileExt::try_lock_exclusive`]) is
//! taken non-blockingly, and the owning process id is written into the file
//! as ASCII so an operator can identify the holder with `cat`. The lock is
//! released automatically when the guard drops, whether that's normal
//! shutdown or an error path unwinding out of `main`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{ElError, Result};

/// RAII guard for the advisory lock at a [`crate::config::Config::lock_path`].
/// Holding one is the only way `RawSampler` binaries are allowed exclusive
/// access to the hardware/upstream connection they wrap.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the lock at `path`, failing with [`ElError::Locked`] if
    /// another process already holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive().map_err(|_| ElError::Locked(path.display().to_string()))?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquisition_fails_while_first_holds_the_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sampler.lock");

        let first = LockGuard::acquire(&path).unwrap();
        let second = LockGuard::acquire(&path);
        assert!(matches!(second, Err(ElError::Locked(_))));

        drop(first);
        let third = LockGuard::acquire(&path);
        assert!(third.is_ok());
    }

    #[test]
    fn lock_file_contains_owning_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sampler.lock");
        let _guard = LockGuard::acquire(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }
}
