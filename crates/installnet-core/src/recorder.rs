//! Capture recorder: the procedure that runs inside the sandbox.
//!
//! # 手順（順序そのものが正しさの条件）
//! 1. capture #1 開始（バッファなし）
//! 2. 依存 manifest だけを offline install（timeout 付き。timeout でも capture は継続）
//! 3. capture #1 を SIGTERM → wait で停止（SIGKILL はしない: pcap が壊れる）
//! 4. capture #2 開始
//! 5. ターゲットだけの manifest を offline install
//! 6. capture #2 停止
//! 7. 2 つの pcap を出力マウントへコピーし status.json を書く
//!    （ENOSPC ならコピー途中の pcap を消してから status を書く）
//!
//! Because the target is installed after its dependencies are already in
//! place, phase 2's traffic is the dependency tree's baseline and phase 5's
//! traffic is what the target adds on top of it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Phase, PhaseReport, RecorderStatus, STATUS_FILE};
use crate::error::RecorderError;
use crate::ports::{Clock, InstallRun, RecorderTools};
use crate::sandbox::{CACHE_MOUNT, DEPENDENCY_MANIFEST, OUT_MOUNT, TARGET_MANIFEST};

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    /// Read-only artifact cache (`--find-links`).
    pub cache_dir: PathBuf,
    /// Writable mount shared with the host: manifests in, captures out.
    pub out_dir: PathBuf,
    /// Container-local directory the captures are written to first.
    pub work_dir: PathBuf,
    pub install_timeout: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(CACHE_MOUNT),
            out_dir: PathBuf::from(OUT_MOUNT),
            work_dir: PathBuf::from("/tmp/installnet-capture"),
            install_timeout: Duration::from_secs(600),
        }
    }
}

pub struct CaptureRecorder {
    tools: Arc<dyn RecorderTools>,
    clock: Arc<dyn Clock>,
    settings: RecorderSettings,
}

impl CaptureRecorder {
    pub fn new(
        tools: Arc<dyn RecorderTools>,
        clock: Arc<dyn Clock>,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            tools,
            clock,
            settings,
        }
    }

    pub async fn record(&self) -> Result<RecorderStatus, RecorderError> {
        tokio::fs::create_dir_all(&self.settings.work_dir)
            .await
            .map_err(|source| RecorderError::Io {
                context: format!("create {}", self.settings.work_dir.display()),
                source,
            })?;

        let dependencies = self
            .phase(
                Phase::Dependencies,
                &self.settings.out_dir.join(DEPENDENCY_MANIFEST),
            )
            .await?;
        let package = self
            .phase(Phase::Package, &self.settings.out_dir.join(TARGET_MANIFEST))
            .await?;

        let resource_exhausted = self.copy_out().await?;

        let status = RecorderStatus {
            dependencies,
            package,
            resource_exhausted,
        };
        if let Err(e) = self.write_status(&status).await {
            // status のない中途半端な bundle を host に渡さない
            self.discard_outputs(true).await;
            return Err(e);
        }
        Ok(status)
    }

    /// Copy both captures to the shared mount. On ENOSPC the partial copies
    /// are removed, which also frees room for `status.json`.
    async fn copy_out(&self) -> Result<bool, RecorderError> {
        for phase in [Phase::Dependencies, Phase::Package] {
            let from = self.settings.work_dir.join(phase.capture_file());
            let to = self.settings.out_dir.join(phase.capture_file());
            match tokio::fs::copy(&from, &to).await {
                Ok(bytes) => tracing::info!(%phase, bytes, "capture copied"),
                Err(e) if is_storage_full(&e) => {
                    tracing::error!(%phase, error = %e, "no space left while copying capture");
                    self.discard_outputs(false).await;
                    return Ok(true);
                }
                Err(source) => {
                    return Err(RecorderError::Io {
                        context: format!("copy {} to {}", from.display(), to.display()),
                        source,
                    });
                }
            }
        }
        Ok(false)
    }

    async fn discard_outputs(&self, with_status: bool) {
        let mut files = vec![
            Phase::Dependencies.capture_file(),
            Phase::Package.capture_file(),
        ];
        if with_status {
            files.push(STATUS_FILE);
        }
        for file in files {
            let path = self.settings.out_dir.join(file);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::warn!(path = %path.display(), "discarded partial output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to discard partial output"),
            }
        }
    }

    async fn phase(&self, phase: Phase, manifest: &Path) -> Result<PhaseReport, RecorderError> {
        let capture_path = self.settings.work_dir.join(phase.capture_file());
        let capture = self.tools.start_capture(&capture_path).await?;
        let started_at = self.clock.now();
        tracing::info!(%phase, capture = %capture_path.display(), "capture started");

        let run = self.install(phase, manifest).await;

        let ended_at = self.clock.now();
        let exit = capture.stop().await?;
        if exit.is_clean() {
            tracing::info!(%phase, ?run, "capture stopped");
        } else {
            tracing::error!(%phase, ?run, code = ?exit.code, "capture ended abnormally; file is truncated");
        }

        Ok(PhaseReport {
            phase,
            started_at,
            ended_at,
            install_exit_code: run.exit_code,
            timed_out: run.timed_out,
            capture_exit_code: exit.code,
        })
    }

    /// Install errors are recorded, never propagated: the capture for the
    /// phase must still be stopped cleanly.
    async fn install(&self, phase: Phase, manifest: &Path) -> InstallRun {
        match tokio::fs::read_to_string(manifest).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::info!(%phase, "manifest is empty; nothing to install");
                return InstallRun {
                    exit_code: Some(0),
                    timed_out: false,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(%phase, manifest = %manifest.display(), error = %e, "manifest unreadable");
                return InstallRun {
                    exit_code: None,
                    timed_out: false,
                };
            }
        }

        match self
            .tools
            .install(manifest, &self.settings.cache_dir, self.settings.install_timeout)
            .await
        {
            Ok(run) => {
                if run.timed_out {
                    tracing::warn!(%phase, timeout = ?self.settings.install_timeout, "install timed out; abandoned");
                }
                run
            }
            Err(e) => {
                tracing::error!(%phase, error = %e, "install could not run");
                InstallRun {
                    exit_code: None,
                    timed_out: false,
                }
            }
        }
    }

    async fn write_status(&self, status: &RecorderStatus) -> Result<(), RecorderError> {
        let path = self.settings.out_dir.join(STATUS_FILE);
        let bytes = serde_json::to_vec_pretty(status).map_err(|e| RecorderError::Io {
            context: "serialize recorder status".into(),
            source: std::io::Error::other(e),
        })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| RecorderError::Io {
                context: format!("write {}", path.display()),
                source,
            })
    }
}

fn is_storage_full(e: &std::io::Error) -> bool {
    // ENOSPC
    e.kind() == std::io::ErrorKind::StorageFull || e.raw_os_error() == Some(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{CaptureExit, CaptureHandle, StepClock};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<String>>>;

    struct FakeCapture {
        name: String,
        events: Events,
        exit: CaptureExit,
    }

    #[async_trait]
    impl CaptureHandle for FakeCapture {
        async fn stop(self: Box<Self>) -> Result<CaptureExit, RecorderError> {
            self.events.lock().unwrap().push(format!("stop {}", self.name));
            Ok(self.exit)
        }
    }

    #[derive(Default)]
    struct FakeTools {
        events: Events,
        timeout_on: Option<&'static str>,
        /// Capture file whose tcpdump exits with an error.
        failing_capture: Option<&'static str>,
    }

    #[async_trait]
    impl RecorderTools for FakeTools {
        async fn start_capture(
            &self,
            output: &Path,
        ) -> Result<Box<dyn CaptureHandle>, RecorderError> {
            let name = output.file_name().unwrap().to_string_lossy().to_string();
            std::fs::write(output, format!("pcap:{name}")).unwrap();
            self.events.lock().unwrap().push(format!("start {name}"));
            let exit = if self.failing_capture == Some(name.as_str()) {
                CaptureExit { code: Some(1) }
            } else {
                CaptureExit::CLEAN
            };
            Ok(Box::new(FakeCapture {
                name,
                events: self.events.clone(),
                exit,
            }))
        }

        async fn install(
            &self,
            manifest: &Path,
            _find_links: &Path,
            _timeout: Duration,
        ) -> Result<InstallRun, RecorderError> {
            let name = manifest.file_name().unwrap().to_string_lossy().to_string();
            self.events.lock().unwrap().push(format!("install {name}"));
            if self.timeout_on == Some(DEPENDENCY_MANIFEST) && name == DEPENDENCY_MANIFEST {
                return Ok(InstallRun {
                    exit_code: None,
                    timed_out: true,
                });
            }
            Ok(InstallRun {
                exit_code: Some(0),
                timed_out: false,
            })
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        settings: RecorderSettings,
        events: Events,
    }

    fn fixture(deps: &str, target: &str) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let settings = RecorderSettings {
            cache_dir: tmp.path().join("cache"),
            out_dir: tmp.path().join("out"),
            work_dir: tmp.path().join("work"),
            install_timeout: Duration::from_secs(5),
        };
        std::fs::create_dir_all(&settings.out_dir).unwrap();
        std::fs::write(settings.out_dir.join(DEPENDENCY_MANIFEST), deps).unwrap();
        std::fs::write(settings.out_dir.join(TARGET_MANIFEST), target).unwrap();
        Fixture {
            _tmp: tmp,
            settings,
            events: Arc::new(Mutex::new(vec![])),
        }
    }

    fn recorder(f: &Fixture, timeout_on: Option<&'static str>) -> CaptureRecorder {
        recorder_with(
            f,
            FakeTools {
                timeout_on,
                ..Default::default()
            },
        )
    }

    fn recorder_with(f: &Fixture, tools: FakeTools) -> CaptureRecorder {
        CaptureRecorder::new(
            Arc::new(FakeTools {
                events: f.events.clone(),
                ..tools
            }),
            Arc::new(StepClock::new(Utc::now(), chrono::Duration::seconds(1))),
            f.settings.clone(),
        )
    }

    /// Every write through `path` fails with ENOSPC.
    #[cfg(target_os = "linux")]
    fn full_disk_at(path: &Path) {
        std::os::unix::fs::symlink("/dev/full", path).unwrap();
    }

    #[tokio::test]
    async fn phases_run_in_strict_order() {
        let f = fixture("b==1.0", "a==1.0");

        let status = recorder(&f, None).record().await.unwrap();

        assert_eq!(
            *f.events.lock().unwrap(),
            vec![
                "start dependencies.pcap",
                "install pkg_requirements.txt",
                "stop dependencies.pcap",
                "start package.pcap",
                "install pkg_only.txt",
                "stop package.pcap",
            ]
        );
        assert!(status.phases_ordered());
        assert!(!status.resource_exhausted);
        assert!(f.settings.out_dir.join("dependencies.pcap").is_file());
        assert!(f.settings.out_dir.join("package.pcap").is_file());

        let written: RecorderStatus = serde_json::from_slice(
            &std::fs::read(f.settings.out_dir.join(STATUS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(written, status);
    }

    #[tokio::test]
    async fn timeout_abandons_install_but_capture_stops_normally() {
        let f = fixture("b==1.0", "a==1.0");

        let status = recorder(&f, Some(DEPENDENCY_MANIFEST)).record().await.unwrap();

        assert!(status.dependencies.timed_out);
        assert_eq!(status.dependencies.install_exit_code, None);
        assert!(!status.package.timed_out);
        let events = f.events.lock().unwrap();
        assert_eq!(events[2], "stop dependencies.pcap");
        assert_eq!(events.len(), 6);
    }

    #[tokio::test]
    async fn empty_dependency_manifest_still_brackets_a_phase() {
        let f = fixture("", "a==1.0");

        let status = recorder(&f, None).record().await.unwrap();

        assert_eq!(
            *f.events.lock().unwrap(),
            vec![
                "start dependencies.pcap",
                "stop dependencies.pcap",
                "start package.pcap",
                "install pkg_only.txt",
                "stop package.pcap",
            ]
        );
        assert_eq!(status.dependencies.install_exit_code, Some(0));
        assert!(f.settings.out_dir.join("dependencies.pcap").is_file());
    }

    #[tokio::test]
    async fn truncated_capture_is_reported_per_phase() {
        let f = fixture("b==1.0", "a==1.0");
        let tools = FakeTools {
            failing_capture: Some("package.pcap"),
            ..Default::default()
        };

        let status = recorder_with(&f, tools).record().await.unwrap();

        assert!(status.dependencies.capture_complete());
        assert_eq!(status.package.capture_exit_code, Some(1));
        assert_eq!(status.truncated_phase(), Some(Phase::Package));
        assert_eq!(f.events.lock().unwrap().len(), 6);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn disk_full_while_copying_leaves_status_and_no_partial_captures() {
        let f = fixture("b==1.0", "a==1.0");
        let deps_out = f.settings.out_dir.join("dependencies.pcap");
        full_disk_at(&deps_out);

        let status = recorder(&f, None).record().await.unwrap();

        assert!(status.resource_exhausted);
        assert!(std::fs::symlink_metadata(&deps_out).is_err());
        assert!(!f.settings.out_dir.join("package.pcap").exists());
        let written: RecorderStatus = serde_json::from_slice(
            &std::fs::read(f.settings.out_dir.join(STATUS_FILE)).unwrap(),
        )
        .unwrap();
        assert!(written.resource_exhausted);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn unwritable_status_discards_the_captures() {
        let f = fixture("b==1.0", "a==1.0");
        full_disk_at(&f.settings.out_dir.join(STATUS_FILE));

        let err = recorder(&f, None).record().await.unwrap_err();

        assert!(matches!(err, RecorderError::Io { .. }));
        assert!(!f.settings.out_dir.join("dependencies.pcap").exists());
        assert!(!f.settings.out_dir.join("package.pcap").exists());
        assert!(std::fs::symlink_metadata(f.settings.out_dir.join(STATUS_FILE)).is_err());
    }
}
