//! RecorderTools port - sandbox 内で使う外部ツール（tcpdump / pip）
//!
//! Recorder の手順（順序が正しさの条件）をツールなしでテストするための境界。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RecorderError;

/// A running packet capture.
///
/// The owner must call `stop`; dropping the handle leaves the capture
/// process to the sandbox teardown.
#[async_trait]
pub trait CaptureHandle: Send {
    /// Ask the capture to finish (SIGTERM) and wait for it to exit.
    async fn stop(self: Box<Self>) -> Result<CaptureExit, RecorderError>;
}

/// How a capture process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureExit {
    /// `None` when the process died from a signal it did not handle.
    pub code: Option<i32>,
}

impl CaptureExit {
    pub const CLEAN: CaptureExit = CaptureExit { code: Some(0) };

    /// Anything but exit 0 means tcpdump stopped writing early (disk full,
    /// interface gone) and the file is truncated.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

/// Result of one bounded install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallRun {
    /// `None` when the installer was killed on timeout.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

#[async_trait]
pub trait RecorderTools: Send + Sync {
    /// Start an unbuffered capture writing to `output`.
    async fn start_capture(&self, output: &Path) -> Result<Box<dyn CaptureHandle>, RecorderError>;

    /// Install `manifest` offline from `find_links`, bounded by `timeout`.
    async fn install(
        &self,
        manifest: &Path,
        find_links: &Path,
        timeout: Duration,
    ) -> Result<InstallRun, RecorderError>;
}
