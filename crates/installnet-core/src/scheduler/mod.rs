//! Job scheduler: one job per package, bounded concurrency.
//!
//! # 方針
//! - 完了済み（`result.json` あり）のパッケージはスケジュール前に落とす
//! - 同じパッケージ名（正規化後）はまとめて 1 job にする
//! - Concurrent: FIFO キュー 1 本を N 個の常駐ワーカーで消化（spawn は stagger 付き）
//! - Sequential: 同じ per-job 関数を入力順に実行
//! - job のエラー / panic はその job の outcome になるだけで、他の job には影響しない

mod queue;
mod summary;
mod worker;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};

pub use self::queue::JobQueue;
pub use self::summary::{JobReport, RunCounts, RunSummary};
pub use self::worker::WorkerGroup;

use crate::domain::{Job, JobOutcome, PackageName, SkipReason};
use crate::ports::PackageAnalyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Concurrent { workers: usize, stagger: Duration },
    Sequential,
}

/// Stops workers from taking new jobs. In-flight jobs run to completion.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn request(&self) {
        // stored even when nobody has subscribed yet
        self.0.send_replace(true);
    }
}

pub struct Scheduler {
    analyzer: Arc<dyn PackageAnalyzer>,
    output_root: PathBuf,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new(analyzer: Arc<dyn PackageAnalyzer>, output_root: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            analyzer,
            output_root: output_root.into(),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    pub async fn run(&self, packages: Vec<PackageName>, mode: RunMode) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut jobs = Vec::new();

        for package in dedup(packages) {
            if self.analyzer.is_complete(&package).await {
                tracing::info!(package = %package, "already analysed; not scheduled");
                summary.record(package, None, JobOutcome::skipped(SkipReason::AlreadyDone));
                continue;
            }
            jobs.push(Job::new(package, &self.output_root));
        }
        tracing::info!(
            scheduled = jobs.len(),
            already_done = summary.counts.skipped,
            ?mode,
            "scheduling jobs"
        );

        let summary = match mode {
            RunMode::Sequential => self.run_sequential(jobs, summary).await,
            RunMode::Concurrent { workers, stagger } => {
                self.run_concurrent(jobs, summary, workers, stagger).await
            }
        };

        tracing::info!(
            done = summary.counts.done,
            skipped = summary.counts.skipped,
            failed = summary.counts.failed,
            "run finished"
        );
        summary
    }

    async fn run_sequential(&self, jobs: Vec<Job>, mut summary: RunSummary) -> RunSummary {
        let shutdown_rx = self.shutdown_tx.subscribe();
        for job in jobs {
            if *shutdown_rx.borrow() {
                tracing::info!("shutdown requested; remaining jobs not started");
                break;
            }
            let (job, outcome) = worker::run_job(Arc::clone(&self.analyzer), job).await;
            summary.record(job.package, Some(job.id), outcome);
        }
        summary
    }

    async fn run_concurrent(
        &self,
        jobs: Vec<Job>,
        summary: RunSummary,
        workers: usize,
        stagger: Duration,
    ) -> RunSummary {
        let queue = Arc::new(JobQueue::from(jobs));
        let summary = Arc::new(Mutex::new(summary));

        let group = WorkerGroup::spawn_staggered(
            workers.max(1),
            stagger,
            Arc::clone(&queue),
            Arc::clone(&self.analyzer),
            Arc::clone(&summary),
            self.shutdown_tx.subscribe(),
        )
        .await;
        tracing::info!(workers = group.len(), "all workers spawned");
        group.join().await;

        let left = queue.len().await;
        if left > 0 {
            tracing::warn!(left, "jobs left in queue after shutdown");
        }
        let summary = summary.lock().await;
        summary.clone()
    }
}

/// First spelling wins; later spellings of the same project are dropped.
fn dedup(packages: Vec<PackageName>) -> Vec<PackageName> {
    let mut seen = HashSet::new();
    packages
        .into_iter()
        .filter(|p| {
            let fresh = seen.insert(p.normalized());
            if !fresh {
                tracing::debug!(package = %p, "duplicate package dropped");
            }
            fresh
        })
        .collect()
}
