//! Build directory locking
//!
//! Two installs of the same formula into the same build directory must not
//! interleave. The lock is an exclusive `flock` on `<build_dir>/<name>.lock`.

use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How old a lock file can be before it's considered stale (2 hours)
const STALE_LOCK_AGE_SECS: u64 = 7200;

#[derive(Error, Debug)]
pub enum LockError {
    #[error(
        "formula '{name}' is already being installed by another process \
         (delete {} if this is incorrect)",
        path.display()
    )]
    Held { name: String, path: PathBuf },
    #[error("cannot create lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Check if a lock file is stale (older than STALE_LOCK_AGE_SECS)
fn is_stale_lock(lock_path: &Path) -> bool {
    if let Ok(metadata) = std::fs::metadata(lock_path)
        && let Ok(modified) = metadata.modified()
        && let Ok(age) = std::time::SystemTime::now().duration_since(modified)
    {
        return age.as_secs() > STALE_LOCK_AGE_SECS;
    }
    false
}

pub fn lock_path(build_dir: &Path, name: &str) -> PathBuf {
    build_dir.join(format!("{}.lock", name))
}

/// Acquire an exclusive lock for installing `name` in `build_dir`.
/// Returns a guard that releases the lock when dropped.
pub fn acquire_build_lock(build_dir: &Path, name: &str) -> Result<BuildLock, LockError> {
    let path = lock_path(build_dir, name);

    if path.exists() && is_stale_lock(&path) {
        tracing::warn!(path = %path.display(), "removing stale lock");
        let _ = std::fs::remove_file(&path);
    }

    let file = File::create(&path).map_err(|source| LockError::Io {
        path: path.clone(),
        source,
    })?;

    if file.try_lock_exclusive().is_err() {
        return Err(LockError::Held {
            name: name.to_string(),
            path,
        });
    }

    tracing::debug!(path = %path.display(), "lock acquired");
    Ok(BuildLock { _file: file, path })
}

/// RAII guard - releases the lock and deletes the lock file when dropped
#[derive(Debug)]
pub struct BuildLock {
    _file: File,
    path: PathBuf,
}

impl BuildLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
