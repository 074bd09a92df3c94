//! Per-repository single-flight for index and graph rebuilds.
//!
//! Each repository gets an advisory lock file next to the database, so jobs
//! started from separate processes against the same store are serialized.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fd_lock::{RwLock, RwLockWriteGuard};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Locates the lock file of each repository inside a directory.
#[derive(Debug, Clone)]
pub struct RepoLocks {
    dir: PathBuf,
}

impl RepoLocks {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Lock files live in the directory holding the database file.
    #[must_use]
    pub fn beside(db_path: &Path) -> Self {
        match db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Self::new(parent),
            _ => Self::new("."),
        }
    }

    fn path_for(&self, repo: &str) -> PathBuf {
        let name: String = repo
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!(".docsmith-{name}.lock"))
    }

    /// Open (creating if needed) the lock file for `repo` without locking it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock directory or file cannot be created.
    pub fn open(&self, repo: &str) -> io::Result<RepoLock> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(repo);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(RepoLock {
            repo: repo.to_owned(),
            path,
            file: RwLock::new(file),
        })
    }
}

/// An open lock file for one repository. The lock is held while the guard
/// returned by [`acquire`](Self::acquire) or [`try_acquire`](Self::try_acquire)
/// is alive and released when it drops, or when the process exits.
pub struct RepoLock {
    repo: String,
    path: PathBuf,
    file: RwLock<File>,
}

impl RepoLock {
    /// Hold the repository only if no other holder has it.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform lock call fails for a reason other
    /// than contention.
    pub fn try_acquire(&mut self) -> io::Result<Option<RwLockWriteGuard<'_, File>>> {
        match self.file.try_write() {
            Ok(guard) => Ok(Some(guard)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn is_busy(&mut self) -> io::Result<bool> {
        Ok(self.try_acquire()?.is_none())
    }

    /// Wait until no other job holds the repository, then hold it until the
    /// guard drops.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform lock call fails.
    ///
    /// # Panics
    ///
    /// Panics when called outside a multi-threaded tokio runtime.
    pub async fn acquire(&mut self) -> io::Result<RwLockWriteGuard<'_, File>> {
        if self.is_busy()? {
            tracing::info!(
                repo = %self.repo,
                lock = %self.path.display(),
                "waiting for running job on repository"
            );
            while self.is_busy()? {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        // Blocks only if another holder took the lock since the last poll.
        tokio::task::block_in_place(|| self.file.write())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn separate_instances_on_one_directory_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let first = RepoLocks::new(dir.path());
        let second = RepoLocks::new(dir.path());

        let mut held = first.open("docs").unwrap();
        let mut waiting = second.open("docs").unwrap();

        let guard = held.try_acquire().unwrap();
        assert!(guard.is_some());
        assert!(waiting.try_acquire().unwrap().is_none());
        drop(guard);
        assert!(waiting.try_acquire().unwrap().is_some());
    }

    #[test]
    fn different_repos_do_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let locks = RepoLocks::new(dir.path());
        let mut a = locks.open("a").unwrap();
        let mut b = locks.open("b").unwrap();
        let _a = a.try_acquire().unwrap().unwrap();
        assert!(b.try_acquire().unwrap().is_some());
    }

    #[test]
    fn lock_file_sits_beside_database() {
        let locks = RepoLocks::beside(Path::new("/var/lib/docsmith/index.db"));
        assert_eq!(
            locks.path_for("org/repo name"),
            Path::new("/var/lib/docsmith/.docsmith-org_repo_name.lock")
        );
        let relative = RepoLocks::beside(Path::new("index.db"));
        assert_eq!(relative.path_for("docs"), Path::new("./.docsmith-docs.lock"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_jobs_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let locks = RepoLocks::new(dir.path());
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let mut lock = locks.open("docs").unwrap();
                let _guard = lock.acquire().await.unwrap();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
