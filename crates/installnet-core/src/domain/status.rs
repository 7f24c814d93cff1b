//! Structured status written by the capture recorder inside the sandbox.
//!
//! This replaces grepping the container log for disk-space errors: the
//! recorder reports what happened in each phase, and the host reads it back
//! from `status.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capture::Phase;

/// File name of the status record in the scratch mount and the bundle.
pub const STATUS_FILE: &str = "status.json";

/// What happened during one install phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Installer exit code; `None` when it was killed or never started.
    pub install_exit_code: Option<i32>,
    pub timed_out: bool,
    /// tcpdump exit code; anything but 0 means the capture is truncated.
    pub capture_exit_code: Option<i32>,
}

impl PhaseReport {
    pub fn capture_complete(&self) -> bool {
        self.capture_exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderStatus {
    pub dependencies: PhaseReport,
    pub package: PhaseReport,
    /// The sandbox ran out of disk (or similar) while capturing or copying.
    #[serde(default)]
    pub resource_exhausted: bool,
}

impl RecorderStatus {
    /// Dependencies phase ended strictly before the package phase started.
    pub fn phases_ordered(&self) -> bool {
        self.dependencies.started_at <= self.dependencies.ended_at
            && self.dependencies.ended_at < self.package.started_at
            && self.package.started_at <= self.package.ended_at
    }

    pub fn any_timed_out(&self) -> bool {
        self.dependencies.timed_out || self.package.timed_out
    }

    /// First phase whose capture did not end cleanly.
    pub fn truncated_phase(&self) -> Option<Phase> {
        [&self.dependencies, &self.package]
            .into_iter()
            .find(|p| !p.capture_complete())
            .map(|p| p.phase)
    }
}
