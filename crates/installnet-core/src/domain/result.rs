//! AnalysisResult: the per-package record persisted as `result.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capture::{CaptureStats, TrafficReport};
use super::ids::RunId;
use super::package::{ArtifactId, PackageName};
use super::status::RecorderStatus;

/// File name of the idempotency marker inside `output_root/<package>/`.
pub const RESULT_FILE: &str = "result.json";

/// Whether the traffic statistics could be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum TrafficStatus {
    Parsed,
    Unparseable(String),
}

/// Written once per job, never mutated.
///
/// `logs` / `build_logs` are persisted as `logs.txt` / `build_logs.txt`
/// next to this record, not inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub run_id: RunId,
    pub package: PackageName,
    pub plan: Vec<ArtifactId>,
    pub dependencies_phase: Option<CaptureStats>,
    pub full_phase: Option<CaptureStats>,
    pub traffic: TrafficStatus,
    pub recorder: Option<RecorderStatus>,
    pub exit_code: i64,
    pub build_started_at: DateTime<Utc>,
    pub build_ended_at: DateTime<Utc>,
    pub install_started_at: DateTime<Utc>,
    pub install_ended_at: DateTime<Utc>,
    #[serde(skip)]
    pub logs: String,
    #[serde(skip)]
    pub build_logs: Vec<String>,
}

impl AnalysisResult {
    /// Both phase blocks, when the captures were parsed.
    pub fn traffic_report(&self) -> Option<TrafficReport> {
        match (&self.dependencies_phase, &self.full_phase) {
            (Some(deps), Some(full)) => Some(TrafficReport {
                dependencies_phase: deps.clone(),
                full_phase: full.clone(),
            }),
            _ => None,
        }
    }

    pub fn with_traffic(mut self, report: TrafficReport) -> Self {
        self.dependencies_phase = Some(report.dependencies_phase);
        self.full_phase = Some(report.full_phase);
        self.traffic = TrafficStatus::Parsed;
        self
    }

    pub fn with_unparseable(mut self, detail: impl Into<String>) -> Self {
        self.dependencies_phase = None;
        self.full_phase = None;
        self.traffic = TrafficStatus::Unparseable(detail.into());
        self
    }
}
