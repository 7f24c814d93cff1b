//! ArtifactDownloader port - 配布物のダウンロード

use std::path::Path;

use async_trait::async_trait;

use crate::domain::ArtifactId;
use crate::error::FetchError;

/// Downloads one pinned artifact (no dependencies) into a flat directory.
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    async fn download(&self, artifact: &ArtifactId, dest: &Path) -> Result<(), FetchError>;
}
