//! Result store: the per-package bundle under `output_root/<package>/`.
//!
//! ```text
//! output_root/<package>/
//!   dependencies.pcap   capture of the dependencies-only phase
//!   package.pcap        capture of the target phase
//!   logs.txt            build start, sandbox output, build end
//!   build_logs.txt      install start, image build lines, install end
//!   status.json         recorder status (when the sandbox wrote one)
//!   result.json         AnalysisResult; its presence means "done"
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::{AnalysisResult, PackageName, Phase, RESULT_FILE, STATUS_FILE};
use crate::error::StoreError;
use crate::sandbox::SandboxRun;

pub const LOGS_FILE: &str = "logs.txt";
pub const BUILD_LOGS_FILE: &str = "build_logs.txt";

#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_dir(&self, package: &PackageName) -> PathBuf {
        self.root.join(package.as_str())
    }

    /// The idempotency marker exists.
    pub async fn is_complete(&self, package: &PackageName) -> bool {
        tokio::fs::metadata(self.bundle_dir(package).join(RESULT_FILE))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Copy captures and status out of the scratch directory and write the
    /// two log files. Does not write `result.json`.
    pub async fn persist_run(
        &self,
        package: &PackageName,
        run: &SandboxRun,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.bundle_dir(package);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| io(format!("create {}", dir.display()), source))?;

        for (from, phase) in [
            (&run.capture_dependencies, Phase::Dependencies),
            (&run.capture_package, Phase::Package),
        ] {
            let to = dir.join(phase.capture_file());
            tokio::fs::copy(from, &to)
                .await
                .map_err(|source| io(format!("copy {}", from.display()), source))?;
        }

        let status = run.scratch().join(STATUS_FILE);
        if tokio::fs::try_exists(&status).await.unwrap_or(false) {
            tokio::fs::copy(&status, dir.join(STATUS_FILE))
                .await
                .map_err(|source| io(format!("copy {}", status.display()), source))?;
        }

        let logs = format!(
            "{}\n{}\n{}\n",
            stamp(run.build_started_at),
            run.full_logs,
            stamp(run.build_ended_at)
        );
        let build_logs = format!(
            "{}\n{}\n{}\n",
            stamp(run.install_started_at),
            run.build_logs.join("\n"),
            stamp(run.install_ended_at)
        );
        write(&dir.join(LOGS_FILE), logs.as_bytes()).await?;
        write(&dir.join(BUILD_LOGS_FILE), build_logs.as_bytes()).await?;

        Ok(dir)
    }

    /// Write `result.json` once. Goes through a temp file + rename so a
    /// crash never leaves a half-written marker behind.
    pub async fn write_result(&self, result: &AnalysisResult) -> Result<PathBuf, StoreError> {
        let dir = self.bundle_dir(&result.package);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| io(format!("create {}", dir.display()), source))?;

        let path = dir.join(RESULT_FILE);
        let bytes = serde_json::to_vec_pretty(result).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        let tmp = dir.join(format!(".{RESULT_FILE}.tmp"));
        write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| io(format!("rename {}", tmp.display()), source))?;
        Ok(path)
    }

    pub async fn load_result(
        &self,
        package: &PackageName,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        let path = self.bundle_dir(package).join(RESULT_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io(format!("read {}", path.display()), source)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Json { path, source })
    }

    /// Every bundle directory under the root, sorted by package name.
    pub async fn bundles(&self) -> Result<Vec<(PackageName, PathBuf)>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|source| io(format!("list {}", self.root.display()), source))?;

        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io(format!("list {}", self.root.display()), source))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match PackageName::new(name) {
                Ok(package) => out.push((package, path)),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "not a bundle"),
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn stamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn io(context: String, source: std::io::Error) -> StoreError {
    StoreError::Io { context, source }
}

async fn write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| io(format!("write {}", path.display()), source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactId, CaptureStats, RunId, TrafficStatus};

    fn result(package: &str) -> AnalysisResult {
        let now = Utc::now();
        AnalysisResult {
            run_id: RunId::generate(),
            package: PackageName::new(package).unwrap(),
            plan: vec![ArtifactId::new(package, "1.0")],
            dependencies_phase: Some(CaptureStats::default()),
            full_phase: Some(CaptureStats::default()),
            traffic: TrafficStatus::Parsed,
            recorder: None,
            exit_code: 0,
            build_started_at: now,
            build_ended_at: now,
            install_started_at: now,
            install_ended_at: now,
            logs: "ignored".into(),
            build_logs: vec![],
        }
    }

    #[tokio::test]
    async fn result_file_is_the_completion_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path());
        let pkg = PackageName::new("six").unwrap();

        // 出力ディレクトリだけでは完了扱いにしない
        std::fs::create_dir_all(store.bundle_dir(&pkg)).unwrap();
        assert!(!store.is_complete(&pkg).await);

        store.write_result(&result("six")).await.unwrap();
        assert!(store.is_complete(&pkg).await);
        assert!(!store.bundle_dir(&pkg).join(".result.json.tmp").exists());
    }

    #[tokio::test]
    async fn load_skips_inline_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path());
        let written = result("six");
        store.write_result(&written).await.unwrap();

        let loaded = store
            .load_result(&written.package)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.run_id, written.run_id);
        assert!(loaded.logs.is_empty());
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path());
        let pkg = PackageName::new("nothing").unwrap();
        assert!(store.load_result(&pkg).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bundles_lists_directories_only() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("b")).unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        std::fs::write(tmp.path().join("summary.json"), b"{}").unwrap();
        let store = ResultStore::new(tmp.path());

        let names: Vec<String> = store
            .bundles()
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
