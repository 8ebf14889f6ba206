//! Request-scoped scratch directory for rendered pages and downloads.
//!
//! Created once per request and released on every exit path. Deletion can
//! fail transiently (a scanner still holding a handle, NFS lag), so
//! [`ScratchDir::release`] retries a bounded number of times and only logs
//! when it gives up. If the request is cancelled before `release` runs, the
//! `Drop` impl makes one last synchronous attempt.

use crate::error::ExtractError;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};

const RETRY_DELAY_MS: u64 = 200;

pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
    attempts: u32,
}

impl ScratchDir {
    /// Create a fresh directory under the system temp dir.
    pub fn new(attempts: u32) -> Result<Self, ExtractError> {
        let dir = tempfile::Builder::new()
            .prefix("kyc-pages-")
            .tempdir()
            .map_err(|e| ExtractError::Internal(format!("Failed to create scratch dir: {e}")))?;
        let path = dir.path().to_path_buf();
        debug!("Scratch dir {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            attempts: attempts.max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory. Never fails; returns whether it is gone.
    pub async fn release(mut self) -> bool {
        let Some(dir) = self.dir.take() else {
            return true;
        };

        let mut last = match dir.close() {
            Ok(()) => {
                debug!("Removed scratch dir {}", self.path.display());
                return true;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => e,
        };

        for attempt in 2..=self.attempts {
            warn!(
                "Could not remove scratch dir {} ({}); attempt {}/{}",
                self.path.display(),
                last,
                attempt,
                self.attempts
            );
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
            match tokio::fs::remove_dir_all(&self.path).await {
                Ok(()) => return true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
                Err(e) => last = e,
            }
        }

        warn!(
            "Giving up on scratch dir {} after {} attempts: {}",
            self.path.display(),
            self.attempts,
            last
        );
        false
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!("Scratch dir {} left behind: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn release_removes_directory_and_contents() {
        let scratch = ScratchDir::new(3).unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(path.join("page-0001.png"), b"x").unwrap();
        assert!(scratch.release().await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn release_tolerates_already_deleted_directory() {
        let scratch = ScratchDir::new(2).unwrap();
        std::fs::remove_dir_all(scratch.path()).unwrap();
        assert!(scratch.release().await);
    }

    #[test]
    fn drop_removes_directory() {
        let path = {
            let scratch = ScratchDir::new(1).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
