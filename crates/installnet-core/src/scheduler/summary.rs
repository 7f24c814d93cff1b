use serde::{Deserialize, Serialize};

use crate::domain::{JobId, JobOutcome, PackageName};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunCounts {
    pub fn total(&self) -> usize {
        self.done + self.skipped + self.failed
    }
}

/// One package's outcome. `job_id` is `None` for packages skipped before
/// scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub package: PackageName,
    pub job_id: Option<JobId>,
    pub outcome: JobOutcome,
}

/// Per-package outcomes in completion order, plus counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
    pub counts: RunCounts,
}

impl RunSummary {
    pub fn record(&mut self, package: PackageName, job_id: Option<JobId>, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Done(_) => self.counts.done += 1,
            JobOutcome::Skipped { .. } => self.counts.skipped += 1,
            JobOutcome::Failed { .. } => self.counts.failed += 1,
        }
        self.reports.push(JobReport {
            package,
            job_id,
            outcome,
        });
    }

    pub fn outcome(&self, package: &str) -> Option<&JobOutcome> {
        self.reports
            .iter()
            .find(|r| r.package.same_project(package))
            .map(|r| &r.outcome)
    }
}
