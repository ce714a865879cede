// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local staging area for multipart uploads.
//!
//! Incoming files land here before they go to the object store. Every
//! staged file is owned by a [`StagedFile`] guard whose `Drop` removes it,
//! so no request path can leak a file: the handler either discards it
//! explicitly once the upload is done or the guard cleans up on the way
//! out. A startup [`LocalStage::sweep`] removes leftovers from crashed
//! processes, which the guard cannot cover.

use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic suffix so two stagings in the same millisecond get distinct names.
static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Staging directory for files received in multipart requests.
#[derive(Clone)]
pub struct LocalStage {
    dir: PathBuf,
}

impl LocalStage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an uploaded part to a uniquely named staged file.
    ///
    /// Only the extension of the client-supplied filename is kept; the rest
    /// of the name is generated, so path components in `original_name`
    /// never reach the filesystem.
    pub async fn stage(&self, original_name: &str, data: &[u8]) -> Result<StagedFile> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create stage dir: {}", e)))?;

        let millis = chrono::Utc::now().timestamp_millis();
        let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let path = self.dir.join(format!("{}-{}-{}{}", millis, std::process::id(), seq, ext));

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to stage upload: {}", e)))?;

        tracing::debug!(path = %path.display(), bytes = data.len(), "Staged upload");

        Ok(StagedFile {
            path,
            released: false,
        })
    }

    /// Whether a staged path still exists on disk.
    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Remove staged files older than `max_age`, returning how many went.
    ///
    /// Run at startup; a missing directory counts as nothing to sweep.
    pub async fn sweep(&self, max_age: Duration) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Failed to read stage dir: {}",
                    e
                )))
            }
        };

        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to read stage dir: {}", e)))?
        {
            let path = entry.path();
            let stale = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age >= max_age);

            if !stale {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to sweep staged file")
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.dir.display(), "Swept stale staged files");
        }
        Ok(removed)
    }
}

/// Owning handle for one staged file.
///
/// `discard` is the normal exit; `Drop` covers every other path (errors,
/// early returns) so the file cannot outlive its request.
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged file now. Idempotent: a file already gone counts
    /// as removed.
    pub async fn discard(mut self) -> Result<()> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Internal(anyhow::anyhow!(
                "Failed to discard staged file: {}",
                e
            ))),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Drop cannot await; the file is small and local, so a synchronous
        // remove is fine here.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}
