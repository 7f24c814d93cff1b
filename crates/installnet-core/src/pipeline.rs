//! Pipeline: the per-package flow behind [`PackageAnalyzer`].
//!
//! # フロー
//! 1. skip-if-done（`result.json` があれば何もしない）
//! 2. Resolve: install plan を作る（部分解でも続行）
//! 3. Fetch: plan 全体を `cache_root/<package>/` に事前ダウンロード
//! 4. Execute: sandbox で 2 フェーズのキャプチャ
//! 5. Persist: キャプチャ・ログ・status を bundle に保存
//! 6. Diff: 保存済みキャプチャから統計を出し `result.json` を書く
//!
//! Every exit path is folded into a [`JobOutcome`]; nothing here returns an
//! error to the scheduler. The cache directory is removed on every path.
//! A run whose status reports exhaustion or a truncated capture, or a failed
//! container without any status, never gets a `result.json`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::domain::{
    AnalysisResult, FailureStage, InstallPlan, Job, JobOutcome, PackageName, Phase, RunId,
    SkipReason, TrafficStatus,
};
use crate::error::{DiffError, SandboxError};
use crate::fetch::{FetchCache, PackageCacheDir};
use crate::impls::{DockerCli, PipDownloader, PipgripSolver, TsharkParser};
use crate::ports::{PackageAnalyzer, SystemClock};
use crate::resolver::PlanResolver;
use crate::retry::RetryPolicy;
use crate::sandbox::{SandboxExecutor, SandboxRun};
use crate::store::ResultStore;
use crate::traffic::TrafficDiffer;

pub struct Pipeline {
    resolver: PlanResolver,
    fetch: FetchCache,
    sandbox: SandboxExecutor,
    differ: TrafficDiffer,
    store: ResultStore,
    cache_root: PathBuf,
}

impl Pipeline {
    pub fn new(
        resolver: PlanResolver,
        fetch: FetchCache,
        sandbox: SandboxExecutor,
        differ: TrafficDiffer,
        store: ResultStore,
        cache_root: PathBuf,
    ) -> Self {
        Self {
            resolver,
            fetch,
            sandbox,
            differ,
            store,
            cache_root,
        }
    }

    /// Wire the process-backed implementations from a prepared config.
    pub fn from_config(config: &Config) -> Self {
        let index_url = config.index_url.clone();
        Self::new(
            PlanResolver::new(Arc::new(PipgripSolver::new(
                config.tools.solver_python.clone(),
                index_url.clone(),
            ))),
            FetchCache::new(Arc::new(PipDownloader::new(
                config.tools.pip_program.clone(),
                index_url,
            ))),
            SandboxExecutor::new(
                Arc::new(DockerCli::new(config.sandbox.docker_program.clone())),
                Arc::new(SystemClock),
                config.sandbox.clone(),
                config.install_timeout_secs,
            ),
            TrafficDiffer::new(
                Arc::new(TsharkParser::new(config.tools.tshark_program.clone())),
                RetryPolicy::retry_once(),
            ),
            ResultStore::new(config.output_root.clone()),
            config.cache_root.clone(),
        )
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    async fn execute(&self, job: &Job) -> JobOutcome {
        let package = &job.package;
        let run_id = RunId::generate();

        let plan = match self.resolver.resolve(package).await {
            Ok(plan) => plan,
            Err(e) => return JobOutcome::failed(FailureStage::Resolve, e.to_string()),
        };
        tracing::info!(package = %package, %run_id, artifacts = plan.len(), "install plan resolved");

        let cache = PackageCacheDir::new(self.cache_root.join(package.as_str()));
        let fetched = self.fetch.fetch(&plan, cache.path()).await;
        match fetched {
            Ok(report) if !report.is_complete() => {
                tracing::warn!(
                    package = %package,
                    failed = report.failed.len(),
                    "some artifacts were not fetched; the offline install will miss them"
                );
            }
            Ok(_) => {}
            Err(e) => {
                cache.cleanup().await;
                return JobOutcome::failed(FailureStage::Fetch, e.to_string());
            }
        }

        let sandboxed = self.sandbox.run(cache.path(), &plan).await;
        cache.cleanup().await;
        let run = match sandboxed {
            Ok(run) => run,
            Err(SandboxError::MissingCapture { path, .. }) => {
                tracing::warn!(package = %package, capture = %path.display(), "sandbox produced no capture");
                return JobOutcome::skipped(SkipReason::MissingCapture(path.display().to_string()));
            }
            Err(SandboxError::ResourceExhausted { .. }) => {
                tracing::error!(package = %package, "sandbox ran out of disk; captures discarded");
                return JobOutcome::skipped(SkipReason::ResourceExhausted);
            }
            Err(e) => return JobOutcome::failed(FailureStage::Sandbox, e.to_string()),
        };

        let bundle = match self.store.persist_run(package, &run).await {
            Ok(dir) => dir,
            Err(e) => return JobOutcome::failed(FailureStage::Persist, e.to_string()),
        };

        // 以下は result.json を書かない: 次回の実行でやり直せるように
        if let Some(reason) = unusable_run(&run) {
            tracing::error!(package = %package, bundle = %bundle.display(), ?reason, "captures not analysed");
            return JobOutcome::skipped(reason);
        }

        let result = self.base_result(run_id, package, &plan, &run);
        let diffed = self
            .differ
            .diff(
                &bundle.join(Phase::Dependencies.capture_file()),
                &bundle.join(Phase::Package.capture_file()),
            )
            .await;

        let (result, skip) = match diffed {
            Ok(report) => (result.with_traffic(report), None),
            Err(DiffError::Unparseable { attempts, message }) => {
                tracing::warn!(package = %package, attempts, error = %message, "captures unparseable; skipping");
                (
                    result.with_unparseable(message.clone()),
                    Some(SkipReason::Unparseable(message)),
                )
            }
            Err(DiffError::MissingCapture(path)) => {
                return JobOutcome::skipped(SkipReason::MissingCapture(path.display().to_string()));
            }
            Err(e) => return JobOutcome::failed(FailureStage::Analyze, e.to_string()),
        };

        if let Err(e) = self.store.write_result(&result).await {
            return JobOutcome::failed(FailureStage::Persist, e.to_string());
        }

        match skip {
            Some(reason) => JobOutcome::skipped(reason),
            None => JobOutcome::done(result),
        }
    }

    fn base_result(
        &self,
        run_id: RunId,
        package: &PackageName,
        plan: &InstallPlan,
        run: &SandboxRun,
    ) -> AnalysisResult {
        AnalysisResult {
            run_id,
            package: package.clone(),
            plan: plan.artifacts().to_vec(),
            dependencies_phase: None,
            full_phase: None,
            traffic: TrafficStatus::Parsed,
            recorder: run.recorder_status.clone(),
            exit_code: run.exit_code,
            build_started_at: run.build_started_at,
            build_ended_at: run.build_ended_at,
            install_started_at: run.install_started_at,
            install_ended_at: run.install_ended_at,
            logs: run.full_logs.clone(),
            build_logs: run.build_logs.clone(),
        }
    }
}

/// Whether the persisted captures can be trusted enough to write the
/// idempotency marker.
fn unusable_run(run: &SandboxRun) -> Option<SkipReason> {
    match &run.recorder_status {
        Some(status) if status.resource_exhausted => Some(SkipReason::ResourceExhausted),
        Some(status) => status
            .truncated_phase()
            .map(|phase| SkipReason::TruncatedCapture(phase.to_string())),
        None if run.exit_code != 0 => Some(SkipReason::RecorderFailed(format!(
            "container exited with {} and left no readable status",
            run.exit_code
        ))),
        None => None,
    }
}

#[async_trait]
impl PackageAnalyzer for Pipeline {
    async fn is_complete(&self, package: &PackageName) -> bool {
        self.store.is_complete(package).await
    }

    async fn analyze(&self, job: &Job) -> JobOutcome {
        if self.is_complete(&job.package).await {
            tracing::info!(package = %job.package, job_id = %job.id, "already analysed; skipping");
            return JobOutcome::skipped(SkipReason::AlreadyDone);
        }
        self.execute(job).await
    }
}
