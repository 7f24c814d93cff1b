//! Impls - ports の実装（外部プロセス経由）
//!
//! # 含まれる実装
//! - **PipgripSolver**: VersionSolver（`pipgrip --tree-json-exact`）
//! - **PipDownloader**: ArtifactDownloader（`pip download --no-deps`）
//! - **DockerCli**: ContainerRuntime（`docker` CLI）
//! - **TsharkParser**: CaptureParser（`tshark -T fields`）
//! - **SystemTools**: RecorderTools（sandbox 内の `tcpdump` / `pip install`）
//!
//! テスト用のフェイクは各モジュールの `#[cfg(test)]` に置く。

pub mod capture_tools;
pub mod docker;
pub mod pip_download;
pub mod pipgrip;
pub mod tshark;

pub use self::capture_tools::SystemTools;
pub use self::docker::DockerCli;
pub use self::pip_download::PipDownloader;
pub use self::pipgrip::PipgripSolver;
pub use self::tshark::TsharkParser;

/// Last few lines of a tool's stderr, for error messages.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    const LINES: usize = 5;
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(LINES);
    lines[start..].join("\n")
}
