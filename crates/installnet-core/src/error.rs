//! Error types, one enum per component.
//!
//! Per-package errors never cross the worker boundary: the pipeline folds
//! them into a [`crate::domain::JobOutcome`]. Only [`ConfigError`] and
//! [`RegistryError`] are meant to abort a whole run.

use std::path::PathBuf;

use thiserror::Error;

use crate::ports::solver::Solution;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackageNameError {
    #[error("package name is empty")]
    Empty,

    #[error("package name {0:?} is not usable as a directory name")]
    Invalid(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("install plan is empty")]
    Empty,

    #[error("duplicate artifact {0} in install plan")]
    Duplicate(String),

    #[error("target {0} must appear exactly once, as the last artifact")]
    TargetNotUnique(String),
}

/// Failure reported by a [`crate::ports::VersionSolver`].
#[derive(Debug, Error)]
pub enum SolveError {
    /// A specific dependency's artifact could not be downloaded or built.
    /// `partial` holds the decisions the solver had reached.
    #[error("failed to download/build artifact for {package}: {message}")]
    ArtifactUnavailable {
        package: String,
        message: String,
        partial: Solution,
    },

    #[error("failed to run solver {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("solver failed: {0}")]
    Failed(String),

    #[error("solver output is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no solution for {0}")]
    NoSolution(String),

    #[error(transparent)]
    Solver(#[from] SolveError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("download of {artifact} failed: {message}")]
    Download { artifact: String, message: String },
}

/// Failure talking to the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected runtime output: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sandbox image build failed: {0}")]
    Build(#[source] RuntimeError),

    #[error("sandbox run failed: {0}")]
    Run(#[source] RuntimeError),

    /// `logs` is the container output, the only record of why the
    /// recorder gave up.
    #[error("sandbox produced no capture at {}", path.display())]
    MissingCapture { path: PathBuf, logs: String },

    #[error("sandbox ran out of disk before its captures were saved")]
    ResourceExhausted { logs: String },
}

/// Failure reported by a [`crate::ports::CaptureParser`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The parsing engine died. Expected now and then; retried once.
    #[error("capture parser crashed: {0}")]
    Crashed(String),

    #[error("capture file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to run capture parser: {0}")]
    Spawn(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("missing capture {0}")]
    MissingCapture(PathBuf),

    #[error("capture parser crashed {attempts} times: {message}")]
    Unparseable { attempts: u32, message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry index {0} lists no packages")]
    EmptyIndex(String),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal capture process: {0}")]
    Signal(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
