//! Fetch cache: pre-download every artifact of a plan before the sandbox runs.
//!
//! The sandboxed install runs offline against this directory, so the
//! installer itself never adds registry traffic to the captures. A failed
//! download is logged and skipped; the install inside the sandbox will then
//! fail to find that artifact, which is itself worth recording.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{ArtifactId, InstallPlan};
use crate::error::FetchError;
use crate::ports::ArtifactDownloader;

/// What made it into the cache directory.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub fetched: Vec<ArtifactId>,
    pub failed: Vec<(ArtifactId, FetchError)>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct FetchCache {
    downloader: Arc<dyn ArtifactDownloader>,
}

impl FetchCache {
    pub fn new(downloader: Arc<dyn ArtifactDownloader>) -> Self {
        Self { downloader }
    }

    /// Download the plan in order into `dest` (created if missing).
    pub async fn fetch(&self, plan: &InstallPlan, dest: &Path) -> Result<FetchReport, FetchError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|source| FetchError::Io {
                context: format!("create {}", dest.display()),
                source,
            })?;

        let mut report = FetchReport::default();
        for artifact in plan.artifacts() {
            tracing::info!(artifact = %artifact, dest = %dest.display(), "downloading");
            match self.downloader.download(artifact, dest).await {
                Ok(()) => {
                    tracing::info!(artifact = %artifact, "downloaded");
                    report.fetched.push(artifact.clone());
                }
                Err(e) => {
                    tracing::warn!(artifact = %artifact, error = %e, "download failed; continuing");
                    report.failed.push((artifact.clone(), e));
                }
            }
        }

        tracing::info!(
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            "all dependencies downloaded"
        );
        Ok(report)
    }
}

/// `cache_root/<package>/`, removed by [`PackageCacheDir::cleanup`].
///
/// Held by the pipeline for the lifetime of one job. If the job returns
/// before calling `cleanup`, `Drop` removes the directory instead
/// (blocking, on whatever thread drops it).
#[derive(Debug)]
pub struct PackageCacheDir {
    path: PathBuf,
    removed: bool,
}

impl PackageCacheDir {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory without blocking the runtime.
    pub async fn cleanup(mut self) {
        report_removal(&self.path, tokio::fs::remove_dir_all(&self.path).await);
        self.removed = true;
    }
}

impl Drop for PackageCacheDir {
    fn drop(&mut self) {
        if !self.removed {
            report_removal(&self.path, std::fs::remove_dir_all(&self.path));
        }
    }
}

fn report_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "cache dir removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove cache dir"),
    }
}
