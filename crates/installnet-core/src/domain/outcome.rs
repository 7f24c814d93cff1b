//! Outcome model: the typed result of one job.
//!
//! The pipeline returns one of these instead of bubbling errors to the
//! worker. A worker therefore never has to guess whether an error means
//! "skip" or "broken": the classification is done where the context is.

use serde::{Deserialize, Serialize};

use super::job::JobStatus;
use super::result::AnalysisResult;

/// Why a job produced no (complete) traffic statistics without being a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// `result.json` already exists.
    AlreadyDone,
    /// The sandbox exited without producing a capture file.
    MissingCapture(String),
    /// The capture parser crashed on the retry as well.
    Unparseable(String),
    /// The sandbox reported disk (or similar) exhaustion.
    ResourceExhausted,
    /// tcpdump exited with an error; the named phase's capture is cut short.
    TruncatedCapture(String),
    /// The container failed and left no readable recorder status.
    RecorderFailed(String),
}

impl SkipReason {
    /// Skips that leave no `result.json`, so the package is tried again on
    /// the next run.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, SkipReason::AlreadyDone | SkipReason::Unparseable(_))
    }
}

/// Which stage failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Resolve,
    Fetch,
    Sandbox,
    Persist,
    Analyze,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub stage: FailureStage,
    pub message: String,
}

impl FailureReason {
    pub fn new(stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// SUCCESS / SKIPPED / FAILED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobOutcome {
    Done(Box<AnalysisResult>),
    Skipped { reason: SkipReason },
    Failed { reason: FailureReason },
}

impl JobOutcome {
    pub fn done(result: AnalysisResult) -> Self {
        JobOutcome::Done(Box::new(result))
    }

    pub fn skipped(reason: SkipReason) -> Self {
        JobOutcome::Skipped { reason }
    }

    pub fn failed(stage: FailureStage, message: impl Into<String>) -> Self {
        JobOutcome::Failed {
            reason: FailureReason::new(stage, message),
        }
    }

    /// Terminal job status this outcome maps to.
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Done(_) => JobStatus::Done,
            JobOutcome::Skipped { .. } => JobStatus::Skipped,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}
