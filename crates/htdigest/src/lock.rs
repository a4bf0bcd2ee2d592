use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive advisory lock guarding one credential file.
///
/// The lock lives on a sidecar `<file>.lock` next to the credential file
/// because rewrites rename a fresh file over the original, which would leave
/// a lock held on the old inode useless. Dropping the guard releases it.
#[derive(Debug)]
pub struct RealmLock {
    file: File,
    path: PathBuf,
}

impl RealmLock {
    /// Block until the lock for `credential_file` is held.
    pub fn acquire(credential_file: &Path) -> io::Result<Self> {
        let path = lock_path(credential_file);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock()?;
        debug!(lock = %path.display(), "acquired realm lock");
        Ok(Self { file, path })
    }

    /// Path of the sidecar lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RealmLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock anyway.
        match self.file.unlock() {
            Ok(()) => debug!(lock = %self.path.display(), "released realm lock"),
            Err(e) => warn!(lock = %self.path.display(), error = %e, "failed to release realm lock"),
        }
    }
}

/// `<dir>/<name>.lock` for a credential file `<dir>/<name>`.
pub(crate) fn lock_path(credential_file: &Path) -> PathBuf {
    let mut name = credential_file
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    credential_file.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::TryLockError;
    use tempfile::tempdir;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/srv/auth/wiki/.htpasswd")),
            PathBuf::from("/srv/auth/wiki/.htpasswd.lock")
        );
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(".htpasswd");

        let guard = RealmLock::acquire(&file_path).unwrap();
        assert!(guard.path().exists());
        // The credential file itself is never created by locking.
        assert!(!file_path.exists());

        let other = File::open(guard.path()).unwrap();
        assert!(matches!(other.try_lock(), Err(TryLockError::WouldBlock)));

        drop(guard);
        other.try_lock().unwrap();
    }

    #[test]
    fn test_lock_missing_directory() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("missing").join(".htpasswd");
        let err = RealmLock::acquire(&file_path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
