//! Run configuration.
//!
//! Built once at startup (defaults ← optional TOML file ← CLI flags) and then
//! shared read-only; every component receives what it needs through its
//! constructor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::PackageName;
use crate::error::ConfigError;

pub const DEFAULT_CACHE_DIR: &str = "./cache/dcache/";
pub const DEFAULT_OUTPUT_DIR: &str = "./out/dynamic/";
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";
pub const DEFAULT_LOG_FILE: &str = "log/installnet.log";

/// Sandbox image and runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub image_tag: String,
    /// Build context directory.
    pub context: PathBuf,
    /// Dockerfile, relative to the working directory.
    pub dockerfile: PathBuf,
    /// Container network mode (`bridge`, `none`, ...).
    pub network: String,
    pub docker_program: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image_tag: "installnet-sandbox".to_string(),
            context: PathBuf::from("."),
            dockerfile: PathBuf::from("sandbox/Dockerfile"),
            network: "bridge".to_string(),
            docker_program: "docker".to_string(),
        }
    }
}

/// External tool names on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Interpreter with `pipgrip` importable; runs the solver script.
    pub solver_python: String,
    pub pip_program: String,
    pub tshark_program: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            solver_python: "python3".to_string(),
            pip_program: "pip".to_string(),
            tshark_program: "tshark".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_root: PathBuf,
    pub output_root: PathBuf,
    pub index_url: String,
    /// Worker count in concurrent mode.
    pub workers: usize,
    /// Delay between spawning consecutive workers.
    pub stagger_secs: u64,
    /// Wall-clock bound of each install phase inside the sandbox.
    pub install_timeout_secs: u64,
    /// Same stream as stdout, appended to this file.
    pub log_file: PathBuf,
    pub sandbox: SandboxConfig,
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_DIR),
            output_root: PathBuf::from(DEFAULT_OUTPUT_DIR),
            index_url: DEFAULT_INDEX_URL.to_string(),
            workers: 10,
            stagger_secs: 60,
            install_timeout_secs: 600,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            sandbox: SandboxConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    pub fn stagger(&self) -> Duration {
        Duration::from_secs(self.stagger_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    /// `cache_root/<package>/`
    pub fn package_cache_dir(&self, package: &PackageName) -> PathBuf {
        self.cache_root.join(package.as_str())
    }

    /// `output_root/<package>/`
    pub fn package_output_dir(&self, package: &PackageName) -> PathBuf {
        self.output_root.join(package.as_str())
    }

    /// Check values and create the cache / output roots.
    ///
    /// Roots are made absolute so they can be bind-mounted into the sandbox.
    pub fn prepare(mut self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.install_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "install timeout must be at least one second".into(),
            ));
        }
        if !(self.index_url.starts_with("http://") || self.index_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "index url {:?} is not an http(s) url",
                self.index_url
            )));
        }
        if !self.index_url.ends_with('/') {
            self.index_url.push('/');
        }

        self.cache_root = ensure_dir(&self.cache_root)?;
        self.output_root = ensure_dir(&self.output_root)?;
        Ok(self)
    }
}

fn ensure_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::Io {
        context: format!("create {}", path.display()),
        source,
    })?;
    std::fs::canonicalize(path).map_err(|source| ConfigError::Io {
        context: format!("resolve {}", path.display()),
        source,
    })
}
