//! Ports - 抽象化レイヤー
//!
//! 外部システム（依存ソルバ、パッケージレジストリ、コンテナランタイム、
//! パケット解析エンジン、sandbox 内のツール）へのインターフェース。
//! 実装は `impls`、テストではフェイクを差し込む。

pub mod analyzer;
pub mod capture_parser;
pub mod clock;
pub mod container;
pub mod downloader;
pub mod recorder_tools;
pub mod solver;

pub use self::analyzer::PackageAnalyzer;
pub use self::capture_parser::CaptureParser;
pub use self::clock::{Clock, StepClock, SystemClock};
pub use self::container::{ContainerId, ContainerRuntime, Mount, RunSpec};
pub use self::downloader::ArtifactDownloader;
pub use self::recorder_tools::{CaptureExit, CaptureHandle, InstallRun, RecorderTools};
pub use self::solver::{Solution, VersionSolver};
