//! SystemTools - sandbox 内の tcpdump / pip を動かす RecorderTools
//!
//! - capture: `tcpdump -U -i any -w <file>`。停止は SIGTERM → wait（pcap を閉じさせる）
//! - install: `pip install --no-index --no-build-isolation --find-links <cache> -r <manifest>`。
//!   sdist の setup.py は offline ではビルド隔離環境を作れないので、イメージ側の
//!   setuptools / wheel でそのままビルドさせる。
//!   専用の process group で起動し、timeout 時はグループごと SIGKILL

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::error::RecorderError;
use crate::ports::{CaptureExit, CaptureHandle, InstallRun, RecorderTools};

/// tcpdump needs a moment to open the interface before traffic counts.
const CAPTURE_SETTLE: Duration = Duration::from_millis(1500);

pub struct SystemTools {
    tcpdump_program: String,
    pip_program: String,
}

impl SystemTools {
    pub fn new(tcpdump_program: impl Into<String>, pip_program: impl Into<String>) -> Self {
        Self {
            tcpdump_program: tcpdump_program.into(),
            pip_program: pip_program.into(),
        }
    }
}

impl Default for SystemTools {
    fn default() -> Self {
        Self::new("tcpdump", "pip")
    }
}

fn capture_args(output: &Path) -> Vec<String> {
    vec![
        "-U".into(),
        "-i".into(),
        "any".into(),
        "-w".into(),
        output.display().to_string(),
    ]
}

fn install_args(manifest: &Path, find_links: &Path) -> Vec<String> {
    vec![
        "install".into(),
        "--no-index".into(),
        "--no-build-isolation".into(),
        "--find-links".into(),
        find_links.display().to_string(),
        "--disable-pip-version-check".into(),
        "--no-input".into(),
        "-r".into(),
        manifest.display().to_string(),
    ]
}

fn pid_of(child: &Child) -> Result<Pid, RecorderError> {
    child
        .id()
        .and_then(|id| i32::try_from(id).ok())
        .map(Pid::from_raw)
        .ok_or_else(|| RecorderError::Signal("process already reaped".into()))
}

struct TcpdumpCapture {
    child: Child,
}

#[async_trait]
impl CaptureHandle for TcpdumpCapture {
    async fn stop(self: Box<Self>) -> Result<CaptureExit, RecorderError> {
        let mut child = self.child;
        let pid = pid_of(&child)?;
        // 先に落ちていても（書き込みエラー等）reap 前の pid なので kill は届く
        kill(pid, Signal::SIGTERM).map_err(|e| RecorderError::Signal(e.to_string()))?;
        let status = child.wait().await.map_err(|source| RecorderError::Io {
            context: "wait for tcpdump".into(),
            source,
        })?;
        tracing::debug!(?status, "tcpdump exited");
        Ok(CaptureExit {
            code: status.code(),
        })
    }
}

#[async_trait]
impl RecorderTools for SystemTools {
    async fn start_capture(&self, output: &Path) -> Result<Box<dyn CaptureHandle>, RecorderError> {
        let mut child = Command::new(&self.tcpdump_program)
            .args(capture_args(output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| RecorderError::Spawn {
                program: self.tcpdump_program.clone(),
                source,
            })?;

        tokio::time::sleep(CAPTURE_SETTLE).await;
        if let Some(status) = child.try_wait().map_err(|source| RecorderError::Io {
            context: "poll tcpdump".into(),
            source,
        })? {
            return Err(RecorderError::Spawn {
                program: self.tcpdump_program.clone(),
                source: std::io::Error::other(format!("exited during startup: {status}")),
            });
        }
        Ok(Box::new(TcpdumpCapture { child }))
    }

    async fn install(
        &self,
        manifest: &Path,
        find_links: &Path,
        timeout: Duration,
    ) -> Result<InstallRun, RecorderError> {
        // stdout/stderr は継承: コンテナのログにそのまま残る
        let mut child = Command::new(&self.pip_program)
            .args(install_args(manifest, find_links))
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| RecorderError::Spawn {
                program: self.pip_program.clone(),
                source,
            })?;
        let pid = pid_of(&child)?;

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| RecorderError::Io {
                    context: "wait for pip".into(),
                    source,
                })?;
                Ok(InstallRun {
                    exit_code: status.code(),
                    timed_out: false,
                })
            }
            Err(_) => {
                // pip とその子（ビルドバックエンド等）をまとめて落とす
                if let Err(e) = killpg(pid, Signal::SIGKILL) {
                    tracing::warn!(error = %e, "failed to kill installer process group");
                }
                if let Err(e) = child.wait().await {
                    tracing::warn!(error = %e, "failed to reap installer");
                }
                Ok(InstallRun {
                    exit_code: None,
                    timed_out: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_is_unbuffered_on_all_interfaces() {
        let args = capture_args(Path::new("/tmp/c/package.pcap"));
        assert_eq!(args, ["-U", "-i", "any", "-w", "/tmp/c/package.pcap"]);
    }

    #[test]
    fn install_is_offline_from_the_cache_mount() {
        let args = install_args(Path::new("/app/out/pkg_only.txt"), Path::new("/app/cache"));
        assert!(args.contains(&"--no-index".to_string()));
        assert!(args.contains(&"--no-build-isolation".to_string()));
        assert!(args.windows(2).any(|w| w == ["--find-links", "/app/cache"]));
        assert!(args.windows(2).any(|w| w == ["-r", "/app/out/pkg_only.txt"]));
    }

    /// Executable shell script standing in for pip.
    fn fake_pip(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-pip");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn install_reports_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = SystemTools::new("tcpdump", fake_pip(tmp.path(), "exit 3"));

        let run = tools
            .install(&tmp.path().join("m.txt"), tmp.path(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(
            run,
            InstallRun {
                exit_code: Some(3),
                timed_out: false
            }
        );
    }

    #[tokio::test]
    async fn installer_builds_sdists_without_isolation() {
        let tmp = tempfile::tempdir().unwrap();
        let argv = tmp.path().join("argv");
        let pip = fake_pip(tmp.path(), &format!("echo \"$@\" > {}", argv.display()));
        let tools = SystemTools::new("tcpdump", pip);

        let run = tools
            .install(&tmp.path().join("pkg_only.txt"), Path::new("/app/cache"), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(run.exit_code, Some(0));
        let argv = std::fs::read_to_string(argv).unwrap();
        assert!(argv.starts_with("install --no-index --no-build-isolation"), "{argv}");
    }

    #[tokio::test]
    async fn install_timeout_kills_the_process_group() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = SystemTools::new("tcpdump", fake_pip(tmp.path(), "sleep 30"));

        let started = std::time::Instant::now();
        let run = tools
            .install(&tmp.path().join("m.txt"), tmp.path(), Duration::from_millis(200))
            .await
            .unwrap();

        assert!(run.timed_out);
        assert_eq!(run.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
