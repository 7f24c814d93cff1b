//! Command-line argument parsing.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use installnet_core::domain::PackageName;
use installnet_core::sandbox::{CACHE_MOUNT, OUT_MOUNT, TIMEOUT_ENV};

/// installnet - record the network traffic a package makes while it installs
#[derive(Parser, Debug)]
#[command(name = "installnet")]
#[command(version)]
#[command(about = "Record the network traffic a package makes while it installs", long_about = None)]
pub struct Cli {
    /// Logging level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// TOML configuration file; explicit flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse one package, or N random packages from the registry
    Run(RunArgs),
    /// Capture procedure; runs inside the sandbox container
    Record(RecordArgs),
    /// Re-run traffic analysis over every bundle in an output directory
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// The package to install, or the number of random packages to install from the index
    #[arg(required_unless_present = "show_index")]
    pub package: Option<Target>,

    /// Directory for pre-downloaded artifacts
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Directory for result bundles
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Simple index URL
    #[arg(long)]
    pub index_url: Option<String>,

    /// Run packages on a concurrent worker pool instead of one by one
    #[arg(long)]
    pub rasync: bool,

    /// Worker count with --rasync
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seconds between spawning consecutive workers
    #[arg(long)]
    pub stagger_secs: Option<u64>,

    /// Wall-clock bound of each install phase, in seconds
    #[arg(long)]
    pub install_timeout_secs: Option<u64>,

    /// Container network mode
    #[arg(long)]
    pub network: Option<String>,

    /// Append logs to this file as well as stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print the package names listed by the index and exit
    #[arg(long)]
    pub show_index: bool,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Read-only artifact cache
    #[arg(long, default_value = CACHE_MOUNT)]
    pub cache_dir: PathBuf,

    /// Writable mount: manifests in, captures and status out
    #[arg(long, default_value = OUT_MOUNT)]
    pub out_dir: PathBuf,

    /// Container-local directory captures are written to first
    #[arg(long, default_value = "/tmp/installnet-capture")]
    pub work_dir: PathBuf,

    /// Wall-clock bound of each install phase, in seconds
    #[arg(long, env = TIMEOUT_ENV, default_value_t = 600)]
    pub install_timeout_secs: u64,

    #[arg(long, default_value = "tcpdump")]
    pub tcpdump: String,

    #[arg(long, default_value = "pip")]
    pub pip: String,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Output root holding one bundle directory per package
    pub output_dir: PathBuf,

    /// Write the JSON summary here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// `run` target: a package name, or a count of random packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Package(PackageName),
    Sample(usize),
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            return s
                .parse()
                .map(Target::Sample)
                .map_err(|e| format!("invalid count {s:?}: {e}"));
        }
        PackageName::new(s)
            .map(Target::Package)
            .map_err(|e| e.to_string())
    }
}
