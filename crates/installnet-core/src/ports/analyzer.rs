//! PackageAnalyzer port - スケジューラから見た 1 パッケージ分の処理
//!
//! Scheduler はこの trait だけを知っている。本番実装は `Pipeline`。

use async_trait::async_trait;

use crate::domain::{Job, JobOutcome, PackageName};

#[async_trait]
pub trait PackageAnalyzer: Send + Sync {
    /// `result.json` already exists for `package`.
    async fn is_complete(&self, package: &PackageName) -> bool;

    /// Run the whole per-package flow. Never panics by contract; the
    /// scheduler still guards against it.
    async fn analyze(&self, job: &Job) -> JobOutcome;
}
