//! ContainerRuntime port - sandbox の実体（Docker など）
//!
//! # 設計原則
//! - 1 ジョブ = 1 コンテナ。生成したコンテナは必ず `remove` で片付ける
//! - ログ取得と wait は別操作（detach 起動のため）

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::RuntimeError;

/// Handle of a started container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(host: &Path, container: &str) -> Self {
        Self {
            host: host.to_path_buf(),
            container: container.to_string(),
            read_only: true,
        }
    }

    pub fn writable(host: &Path, container: &str) -> Self {
        Self {
            host: host.to_path_buf(),
            container: container.to_string(),
            read_only: false,
        }
    }
}

/// Everything needed to start one sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub image: String,
    pub mounts: Vec<Mount>,
    pub network: String,
    /// Extra capabilities (packet capture needs NET_RAW / NET_ADMIN).
    pub cap_add: Vec<String>,
    pub env: Vec<(String, String)>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build (or reuse from cache) the image; returns the build log lines.
    async fn build_image(
        &self,
        context: &Path,
        dockerfile: &Path,
        tag: &str,
    ) -> Result<Vec<String>, RuntimeError>;

    async fn run_detached(&self, spec: &RunSpec) -> Result<ContainerId, RuntimeError>;

    /// Block until the container exits; returns its exit code.
    async fn wait(&self, id: &ContainerId) -> Result<i64, RuntimeError>;

    /// Combined stdout/stderr.
    async fn logs(&self, id: &ContainerId) -> Result<String, RuntimeError>;

    async fn remove(&self, id: &ContainerId) -> Result<(), RuntimeError>;
}
