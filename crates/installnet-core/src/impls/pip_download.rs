//! PipDownloader - `pip download` で 1 アーティファクトずつ取得

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::ArtifactId;
use crate::error::FetchError;
use crate::impls::stderr_tail;
use crate::ports::ArtifactDownloader;

pub struct PipDownloader {
    program: String,
    index_url: String,
}

impl PipDownloader {
    pub fn new(program: impl Into<String>, index_url: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            index_url: index_url.into(),
        }
    }

    fn args(&self, artifact: &ArtifactId, dest: &Path) -> Vec<String> {
        vec![
            "download".into(),
            "--no-deps".into(),
            "--no-input".into(),
            "--no-clean".into(),
            "--disable-pip-version-check".into(),
            "--index-url".into(),
            self.index_url.clone(),
            "--dest".into(),
            dest.display().to_string(),
            artifact.requirement(),
        ]
    }
}

#[async_trait]
impl ArtifactDownloader for PipDownloader {
    async fn download(&self, artifact: &ArtifactId, dest: &Path) -> Result<(), FetchError> {
        let output = Command::new(&self.program)
            .args(self.args(artifact, dest))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| FetchError::Io {
                context: format!("run {}", self.program),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Download {
                artifact: artifact.to_string(),
                message: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }
}
