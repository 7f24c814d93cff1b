use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::queue::JobQueue;
use super::summary::RunSummary;
use crate::domain::{FailureStage, Job, JobOutcome};
use crate::ports::PackageAnalyzer;

/// Worker group handle.
/// - ワーカーはキューが空になったら自分で終わる
/// - shutdown を送ると新しい job を取らなくなる（実行中の job は最後まで走る）
/// - `join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn up to `n` workers, sleeping `stagger` between consecutive
    /// spawns. Stops spawning early once the queue is drained.
    pub async fn spawn_staggered(
        n: usize,
        stagger: Duration,
        queue: Arc<JobQueue>,
        analyzer: Arc<dyn PackageAnalyzer>,
        summary: Arc<Mutex<RunSummary>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            if worker_id > 0 {
                tokio::time::sleep(stagger).await;
            }
            if queue.is_empty().await || *shutdown_rx.borrow() {
                break;
            }

            let q = Arc::clone(&queue);
            let a = Arc::clone(&analyzer);
            let s = Arc::clone(&summary);
            let rx = shutdown_rx.clone();
            tracing::info!(worker_id, "spawning worker");
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, q, a, s, rx).await;
            }));
        }
        Self { joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Wait for every worker to drain the queue (or observe shutdown).
    pub async fn join(self) {
        for j in self.joins {
            if let Err(e) = j.await {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<JobQueue>,
    analyzer: Arc<dyn PackageAnalyzer>,
    summary: Arc<Mutex<RunSummary>>,
    shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            tracing::info!(worker_id, "shutdown requested; worker stops taking jobs");
            break;
        }
        let Some(job) = queue.claim().await else {
            break;
        };

        let (job, outcome) = run_job(Arc::clone(&analyzer), job).await;
        summary
            .lock()
            .await
            .record(job.package.clone(), Some(job.id), outcome);
    }
    tracing::debug!(worker_id, "worker finished");
}

/// Run one job in its own task so a panic becomes `Failed(Worker)` instead
/// of taking the worker down.
pub(crate) async fn run_job(analyzer: Arc<dyn PackageAnalyzer>, mut job: Job) -> (Job, JobOutcome) {
    job.mark_running();
    tracing::info!(package = %job.package, job_id = %job.id, "job started");

    let claimed = job.clone();
    let handle = tokio::spawn(async move { analyzer.analyze(&claimed).await });
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(package = %job.package, job_id = %job.id, error = %e, "job panicked");
            JobOutcome::failed(FailureStage::Worker, e.to_string())
        }
    };

    job.finish(outcome.status());
    match &outcome {
        JobOutcome::Done(_) => {
            tracing::info!(package = %job.package, job_id = %job.id, "job done")
        }
        JobOutcome::Skipped { reason } => {
            tracing::warn!(package = %job.package, job_id = %job.id, ?reason, "job skipped")
        }
        JobOutcome::Failed { reason } => tracing::error!(
            package = %job.package,
            job_id = %job.id,
            stage = ?reason.stage,
            error = %reason.message,
            "job failed"
        ),
    }
    (job, outcome)
}
