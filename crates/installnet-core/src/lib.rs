//! installnet-core
//!
//! Core building blocks for installnet: install a package inside a
//! disposable sandbox, capture its network traffic in two phases, and
//! report what the package itself adds on top of its dependencies.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, package, plan, job, capture, status, outcome, result）
//! - **ports**: 抽象化レイヤー（VersionSolver, ArtifactDownloader, ContainerRuntime, CaptureParser, RecorderTools, PackageAnalyzer, Clock）
//! - **impls**: ports の実装（pipgrip, pip, docker, tshark, tcpdump）
//! - **resolver / fetch / sandbox / recorder / traffic**: パイプラインの各段
//! - **pipeline**: 1 パッケージ分のフロー（Resolve → Fetch → Execute → Persist → Diff）
//! - **scheduler**: ワーカープール、skip-if-done、失敗の分離
//! - **store / registry / reanalysis**: 結果バンドル、レジストリ index、オフライン再解析
//! - **config / error / retry**: 設定、エラー型、リトライポリシー

pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod impls;
pub mod pipeline;
pub mod ports;
pub mod reanalysis;
pub mod recorder;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod sandbox;
pub mod scheduler;
pub mod store;
pub mod traffic;

pub use config::Config;
pub use pipeline::Pipeline;
pub use scheduler::{RunMode, RunSummary, Scheduler};
