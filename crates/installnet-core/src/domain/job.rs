//! Job: one package's end-to-end analysis unit.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::package::PackageName;

/// Job status.
///
/// State transitions:
/// - Pending -> Running -> Done
/// - Pending -> Running -> Skipped
/// - Pending -> Running -> Failed
///
/// Done / Skipped / Failed are terminal; a terminal job is never touched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Skipped,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Skipped | JobStatus::Failed)
    }
}

/// A queued or claimed job.
///
/// Design:
/// - The queue owns pending jobs.
/// - `claim()` hands ownership to a worker; the queue keeps no reference.
/// - Status changes only through methods, and only forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub package: PackageName,
    pub output_dir: PathBuf,
    status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(package: PackageName, output_root: &Path) -> Self {
        let output_dir = output_root.join(package.as_str());
        Self {
            id: JobId::generate(),
            package,
            output_dir,
            status: JobStatus::Pending,
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Pending -> Running. No-op on any other state.
    pub fn mark_running(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Running -> terminal. Ignored once the job is terminal.
    pub fn finish(&mut self, status: JobStatus) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(PackageName::new("six").unwrap(), Path::new("/out"))
    }

    #[test]
    fn output_dir_is_keyed_by_package() {
        assert_eq!(job().output_dir, PathBuf::from("/out/six"));
    }

    #[test]
    fn walks_forward_only() {
        let mut j = job();
        assert_eq!(j.status(), JobStatus::Pending);

        j.mark_running();
        assert_eq!(j.status(), JobStatus::Running);
        assert!(j.started_at.is_some());

        j.finish(JobStatus::Done);
        assert_eq!(j.status(), JobStatus::Done);

        // terminal は不変
        j.finish(JobStatus::Failed);
        j.mark_running();
        assert_eq!(j.status(), JobStatus::Done);
    }

    #[test]
    fn finish_rejects_non_terminal_target() {
        let mut j = job();
        j.mark_running();
        j.finish(JobStatus::Pending);
        assert_eq!(j.status(), JobStatus::Running);
    }
}
