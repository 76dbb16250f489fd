use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per working-copy folder.
///
/// A sync pass holds its folder's lock from cursor load to persistence, so
/// two passes never pull the same working copy at once, even when they come
/// from different project ids. A second pass waits for the first instead of
/// being skipped.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `folder` is free and take it.
    pub async fn acquire(&self, folder: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(folder.to_path_buf()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_folder_is_exclusive() {
        let locks = ProjectLocks::new();
        let folder = Path::new("/code/p");
        let guard = locks.acquire(folder).await;

        let waiting = tokio::time::timeout(Duration::from_millis(50), locks.acquire(folder)).await;
        assert!(waiting.is_err());

        drop(guard);
        let again = tokio::time::timeout(Duration::from_millis(500), locks.acquire(folder)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn different_folders_do_not_block_each_other() {
        let locks = ProjectLocks::new();
        let _p = locks.acquire(Path::new("/code/p")).await;
        let q = tokio::time::timeout(
            Duration::from_millis(500),
            locks.acquire(Path::new("/code/q")),
        )
        .await;
        assert!(q.is_ok());
    }

    #[tokio::test]
    async fn clones_share_the_same_locks() {
        let locks = ProjectLocks::new();
        let other = locks.clone();
        let _guard = locks.acquire(Path::new("/code/p")).await;
        let waiting = tokio::time::timeout(
            Duration::from_millis(50),
            other.acquire(Path::new("/code/p")),
        )
        .await;
        assert!(waiting.is_err());
    }
}
