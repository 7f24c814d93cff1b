//! Domain model (ids, packages, plans, jobs, captures, outcomes, results).
//!
//! I/O を持たない純粋な型だけを置く。ports / impls / pipeline から参照される。

pub mod capture;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod package;
pub mod plan;
pub mod result;
pub mod status;

pub use capture::{CaptureStats, Contribution, PacketRecord, PcapFilter, Phase, TrafficReport};
pub use ids::{JobId, RunId};
pub use job::{Job, JobStatus};
pub use outcome::{FailureReason, FailureStage, JobOutcome, SkipReason};
pub use package::{ArtifactId, PackageName};
pub use plan::InstallPlan;
pub use result::{AnalysisResult, RESULT_FILE, TrafficStatus};
pub use status::{PhaseReport, RecorderStatus, STATUS_FILE};
