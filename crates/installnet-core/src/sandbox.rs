//! Sandbox executor: one disposable container per package.
//!
//! # フロー
//! 1. scratch ディレクトリ（書き込み可）を作り、manifest 2 つを書く
//! 2. イメージを build（キャッシュがあれば再利用）
//! 3. cache を read-only、scratch を read-write でマウントして detach 起動
//! 4. wait → logs 取得 → **終了コードに関係なく** remove
//! 5. status.json を読み、scratch にキャプチャ 2 つがあるか確認
//!    （失敗時はコンテナのログを warn で残し、エラーにも載せる）
//!
//! The scratch directory and the manifests inside it are the whole protocol
//! between this module and the capture recorder running in the container.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::config::SandboxConfig;
use crate::domain::{InstallPlan, Phase, RecorderStatus, STATUS_FILE};
use crate::error::{RuntimeError, SandboxError};
use crate::ports::{Clock, ContainerId, ContainerRuntime, Mount, RunSpec};

/// Where the fetched artifacts are mounted (read-only).
pub const CACHE_MOUNT: &str = "/app/cache";
/// Where the scratch directory is mounted (read-write).
pub const OUT_MOUNT: &str = "/app/out";
/// Every dependency of the target, one requirement per line.
pub const DEPENDENCY_MANIFEST: &str = "pkg_requirements.txt";
/// The target only.
pub const TARGET_MANIFEST: &str = "pkg_only.txt";
/// Environment variable carrying the per-phase install timeout.
pub const TIMEOUT_ENV: &str = "INSTALLNET_INSTALL_TIMEOUT_SECS";

/// Everything a finished sandbox left behind.
///
/// The capture paths point into a scratch directory owned by this value; it
/// is deleted when the value is dropped, so persist first.
#[derive(Debug)]
pub struct SandboxRun {
    pub full_logs: String,
    pub build_logs: Vec<String>,
    pub capture_dependencies: PathBuf,
    pub capture_package: PathBuf,
    pub recorder_status: Option<RecorderStatus>,
    pub exit_code: i64,
    pub build_started_at: DateTime<Utc>,
    pub build_ended_at: DateTime<Utc>,
    pub install_started_at: DateTime<Utc>,
    pub install_ended_at: DateTime<Utc>,
    scratch: TempDir,
}

impl SandboxRun {
    pub fn scratch(&self) -> &Path {
        self.scratch.path()
    }
}

pub struct SandboxExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    clock: Arc<dyn Clock>,
    settings: SandboxConfig,
    install_timeout_secs: u64,
}

impl SandboxExecutor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        clock: Arc<dyn Clock>,
        settings: SandboxConfig,
        install_timeout_secs: u64,
    ) -> Self {
        Self {
            runtime,
            clock,
            settings,
            install_timeout_secs,
        }
    }

    pub async fn run(&self, dest_dir: &Path, plan: &InstallPlan) -> Result<SandboxRun, SandboxError> {
        let scratch = tempfile::Builder::new()
            .prefix("installnet-out-")
            .tempdir()
            .map_err(|source| SandboxError::Io {
                context: "create scratch directory".into(),
                source,
            })?;
        write_manifests(scratch.path(), plan).await?;

        let build_started_at = self.clock.now();
        let build_logs = self
            .runtime
            .build_image(
                &self.settings.context,
                &self.settings.dockerfile,
                &self.settings.image_tag,
            )
            .await
            .map_err(SandboxError::Build)?;
        for line in &build_logs {
            tracing::debug!(target: "installnet::sandbox::build", "{line}");
        }
        let build_ended_at = self.clock.now();

        let spec = self.run_spec(dest_dir, scratch.path());
        let install_started_at = self.clock.now();
        let id = self
            .runtime
            .run_detached(&spec)
            .await
            .map_err(SandboxError::Run)?;
        tracing::info!(container = %id, package = %plan.target(), "container started");

        let supervised = self.supervise(&id).await;
        let install_ended_at = self.clock.now();

        // exit code に関係なく片付ける
        if let Err(e) = self.runtime.remove(&id).await {
            tracing::warn!(container = %id, error = %e, "failed to remove container");
        }

        let (exit_code, full_logs) = supervised.map_err(SandboxError::Run)?;
        tracing::info!(container = %id, exit_code, "container finished");

        let recorder_status = read_status(&scratch.path().join(STATUS_FILE)).await;
        let capture_dependencies = scratch.path().join(Phase::Dependencies.capture_file());
        let capture_package = scratch.path().join(Phase::Package.capture_file());
        let missing = [&capture_dependencies, &capture_package]
            .into_iter()
            .find(|capture| !capture.is_file());

        if exit_code != 0 || missing.is_some() {
            tracing::warn!(container = %id, exit_code, logs = %full_logs, "recorder output");
        }
        if let Some(path) = missing {
            if recorder_status.as_ref().is_some_and(|s| s.resource_exhausted) {
                return Err(SandboxError::ResourceExhausted { logs: full_logs });
            }
            return Err(SandboxError::MissingCapture {
                path: path.clone(),
                logs: full_logs,
            });
        }

        Ok(SandboxRun {
            full_logs,
            build_logs,
            capture_dependencies,
            capture_package,
            recorder_status,
            exit_code,
            build_started_at,
            build_ended_at,
            install_started_at,
            install_ended_at,
            scratch,
        })
    }

    fn run_spec(&self, dest_dir: &Path, scratch: &Path) -> RunSpec {
        RunSpec {
            image: self.settings.image_tag.clone(),
            mounts: vec![
                Mount::read_only(dest_dir, CACHE_MOUNT),
                Mount::writable(scratch, OUT_MOUNT),
            ],
            network: self.settings.network.clone(),
            cap_add: vec!["NET_RAW".into(), "NET_ADMIN".into()],
            env: vec![(TIMEOUT_ENV.into(), self.install_timeout_secs.to_string())],
        }
    }

    /// wait + logs. Either failing still lets the caller remove the container.
    async fn supervise(&self, id: &ContainerId) -> Result<(i64, String), RuntimeError> {
        let exit_code = self.runtime.wait(id).await?;
        let logs = self.runtime.logs(id).await?;
        Ok((exit_code, logs))
    }
}

async fn write_manifests(scratch: &Path, plan: &InstallPlan) -> Result<(), SandboxError> {
    for (file, contents) in [
        (DEPENDENCY_MANIFEST, plan.dependency_manifest()),
        (TARGET_MANIFEST, plan.target_manifest()),
    ] {
        let path = scratch.join(file);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| SandboxError::Io {
                context: format!("write {}", path.display()),
                source,
            })?;
    }
    Ok(())
}

/// A missing or unreadable status file is not fatal: the captures alone are
/// still a result.
async fn read_status(path: &Path) -> Option<RecorderStatus> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "recorder status missing");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "recorder status unreadable");
            None
        }
    }
}
