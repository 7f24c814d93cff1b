//! installnet binary entrypoint.
//!
//! - `run`: schedule packages through the pipeline on the host
//! - `record`: the capture procedure inside the sandbox container
//! - `analyze`: offline re-analysis of persisted bundles

mod args;
mod logging;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use installnet_core::domain::JobOutcome;
use installnet_core::impls::{SystemTools, TsharkParser};
use installnet_core::ports::SystemClock;
use installnet_core::reanalysis::reanalyze;
use installnet_core::recorder::{CaptureRecorder, RecorderSettings};
use installnet_core::registry::RegistryIndex;
use installnet_core::retry::RetryPolicy;
use installnet_core::store::ResultStore;
use installnet_core::traffic::TrafficDiffer;
use installnet_core::{Config, Pipeline, RunMode, Scheduler};

use crate::args::{AnalyzeArgs, Cli, Command, RecordArgs, RunArgs, Target};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_config = settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => {
            let config = settings::apply(file_config, &args);
            let _guard = logging::init(&cli.log_level, Some(&config.log_file));
            run(config, args).await
        }
        Command::Record(args) => {
            // container stdout is the log; docker logs collects it
            let _guard = logging::init(&cli.log_level, None);
            record(args).await
        }
        Command::Analyze(args) => {
            let _guard = logging::init(&cli.log_level, None);
            analyze(file_config, args).await
        }
    }
}

async fn run(config: Config, args: RunArgs) -> Result<()> {
    let config = config.prepare().context("invalid configuration")?;
    tracing::info!(
        cache_root = %config.cache_root.display(),
        output_root = %config.output_root.display(),
        index_url = %config.index_url,
        "installnet starting"
    );

    let registry = RegistryIndex::new(config.index_url.clone());
    if args.show_index {
        for name in registry.fetch().await? {
            println!("{name}");
        }
        return Ok(());
    }

    let packages = match args.package {
        Some(Target::Package(name)) => vec![name],
        Some(Target::Sample(n)) => {
            let sample = registry.sample(n).await.context("failed to sample the registry")?;
            tracing::info!(requested = n, sampled = sample.len(), "installing random packages");
            sample
        }
        None => return Ok(()),
    };

    let mode = if args.rasync {
        RunMode::Concurrent {
            workers: config.workers,
            stagger: config.stagger(),
        }
    } else {
        RunMode::Sequential
    };

    let pipeline = Arc::new(Pipeline::from_config(&config));
    let scheduler = Scheduler::new(pipeline, config.output_root.clone());

    let shutdown = scheduler.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing running jobs");
            shutdown.request();
        }
    });

    let summary = scheduler.run(packages, mode).await;
    for report in &summary.reports {
        match &report.outcome {
            JobOutcome::Done(result) => {
                let contribution = result.traffic_report().map(|r| r.package_contribution());
                tracing::info!(package = %report.package, ?contribution, "done");
            }
            JobOutcome::Skipped { reason } => {
                tracing::info!(package = %report.package, ?reason, retriable = reason.is_retriable(), "skipped")
            }
            JobOutcome::Failed { reason } => {
                tracing::info!(package = %report.package, stage = ?reason.stage, error = %reason.message, "failed")
            }
        }
    }
    Ok(())
}

async fn record(args: RecordArgs) -> Result<()> {
    let settings = RecorderSettings {
        cache_dir: args.cache_dir,
        out_dir: args.out_dir,
        work_dir: args.work_dir,
        install_timeout: Duration::from_secs(args.install_timeout_secs),
    };
    let recorder = CaptureRecorder::new(
        Arc::new(SystemTools::new(args.tcpdump, args.pip)),
        Arc::new(SystemClock),
        settings,
    );

    let status = recorder.record().await.context("capture failed")?;
    tracing::info!(
        dependencies_exit = ?status.dependencies.install_exit_code,
        package_exit = ?status.package.install_exit_code,
        timed_out = status.any_timed_out(),
        resource_exhausted = status.resource_exhausted,
        "capture finished"
    );
    Ok(())
}

async fn analyze(config: Config, args: AnalyzeArgs) -> Result<()> {
    let store = ResultStore::new(args.output_dir);
    let differ = TrafficDiffer::new(
        Arc::new(TsharkParser::new(config.tools.tshark_program)),
        RetryPolicy::retry_once(),
    );

    let analysed = reanalyze(&store, &differ)
        .await
        .with_context(|| format!("failed to read bundles under {}", store.root().display()))?;
    let json = serde_json::to_string_pretty(&analysed)?;

    match args.out {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), packages = analysed.len(), "analysis written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
