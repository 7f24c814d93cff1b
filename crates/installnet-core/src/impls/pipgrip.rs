//! PipgripSolver - pipgrip のライブラリ API を Python 経由で呼ぶ VersionSolver
//!
//! The pipgrip CLI prints nothing when a dependency's wheel fails to build,
//! so the solver runs a small embedded script against pipgrip's
//! `VersionSolver` instead. The script prints the decisions reached so far
//! even after that failure:
//!
//! ```json
//! {"decisions": ["a==1.0", "b==1.0"], "edges": [["a", "b"]], "error": null}
//! ```

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{ArtifactId, PackageName};
use crate::error::SolveError;
use crate::impls::stderr_tail;
use crate::ports::{Solution, VersionSolver};

/// Message pipgrip emits when a dependency's wheel cannot be obtained.
const WHEEL_FAILURE: &str = "Failed to download/build wheel";

const SOLVE_SCRIPT: &str = include_str!("pipgrip_solve.py");

pub struct PipgripSolver {
    python: String,
    index_url: String,
}

impl PipgripSolver {
    /// `python` must be able to `import pipgrip`.
    pub fn new(python: impl Into<String>, index_url: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            index_url: index_url.into(),
        }
    }
}

#[async_trait]
impl VersionSolver for PipgripSolver {
    async fn solve(&self, package: &PackageName) -> Result<Solution, SolveError> {
        tracing::debug!(package = %package, python = %self.python, "solving");
        let output = tokio::process::Command::new(&self.python)
            .arg("-c")
            .arg(SOLVE_SCRIPT)
            .arg(&self.index_url)
            .arg(package.as_str())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SolveError::Spawn {
                program: self.python.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SolveError::Failed(stderr_tail(&output.stderr)));
        }
        interpret(&String::from_utf8_lossy(&output.stdout))
    }
}

#[derive(Debug, Deserialize)]
struct SolveReport {
    decisions: Vec<String>,
    #[serde(default)]
    edges: Vec<(String, String)>,
    error: Option<String>,
}

/// Turn the script's report into a solution, or into `ArtifactUnavailable`
/// carrying the partial one.
pub(crate) fn interpret(stdout: &str) -> Result<Solution, SolveError> {
    let report: SolveReport =
        serde_json::from_str(stdout.trim()).map_err(|e| SolveError::Malformed(e.to_string()))?;

    let mut solution = Solution::new();
    for pin in &report.decisions {
        solution.decide(parse_pin(pin)?);
    }
    for (from, to) in &report.edges {
        solution.depend(strip_extras(from), strip_extras(to));
    }

    match report.error {
        None => Ok(solution),
        Some(message) if message.contains(WHEEL_FAILURE) => Err(SolveError::ArtifactUnavailable {
            package: unavailable_package(&message).unwrap_or_else(|| "unknown".to_string()),
            message,
            partial: solution,
        }),
        Some(message) => Err(SolveError::Failed(message)),
    }
}

fn strip_extras(name: &str) -> &str {
    name.split('[').next().unwrap_or(name).trim()
}

/// `name[extra]==version` → `ArtifactId { name, version }`.
fn parse_pin(pin: &str) -> Result<ArtifactId, SolveError> {
    let (name, version) = pin
        .split_once("==")
        .ok_or_else(|| SolveError::Malformed(format!("not an exact pin: {pin}")))?;
    let name = strip_extras(name);
    let version = version.trim();
    if name.is_empty() || version.is_empty() {
        return Err(SolveError::Malformed(format!("not an exact pin: {pin}")));
    }
    Ok(ArtifactId::new(name, version))
}

/// The package named in a wheel failure, e.g.
/// `Failed to download/build wheel for foo==1.0` → `foo`.
fn unavailable_package(message: &str) -> Option<String> {
    let line = message.lines().find(|l| l.contains(WHEEL_FAILURE))?;
    let rest = &line[line.find(WHEEL_FAILURE)? + WHEEL_FAILURE.len()..];
    let token = rest
        .trim_start()
        .trim_start_matches("for")
        .split_whitespace()
        .next()
        .unwrap_or("");
    let name = token
        .split(['=', '<', '>', '!', '~', '[', ':'])
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| c == '\'' || c == '"');
    if name.is_empty() {
        Some("unknown".to_string())
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn full_solution_keeps_decisions_and_edges() {
        let stdout = r#"{"decisions": ["a==1.0", "b==1.0", "d==1.0", "c==1.0"],
            "edges": [["a", "b"], ["b", "d"], ["a", "c"], ["c", "d"]], "error": null}"#;

        let solution = interpret(stdout).unwrap();

        let names: Vec<&str> = solution.decisions().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d", "c"]);
        assert_eq!(solution.dependencies_of("a"), ["b", "c"]);
        assert_eq!(solution.dependencies_of("c"), ["d"]);
        assert!(solution.dependencies_of("d").is_empty());
    }

    #[test]
    fn wheel_failure_carries_the_partial_solution() {
        let stdout = r#"{"decisions": ["a==1.0", "b==1.0"], "edges": [["a", "b"], ["a", "lxml"]],
            "error": "Failed to download/build wheel for lxml==4.9.0"}"#;

        let err = interpret(stdout).unwrap_err();

        let SolveError::ArtifactUnavailable { package, partial, .. } = err else {
            panic!("expected ArtifactUnavailable, got {err:?}");
        };
        assert_eq!(package, "lxml");
        assert_eq!(partial.decisions().len(), 2);
        assert!(partial.decision("lxml").is_none());
        assert_eq!(partial.dependencies_of("a"), ["b", "lxml"]);
    }

    #[test]
    fn extras_are_dropped_from_names() {
        let stdout = r#"{"decisions": ["requests[socks]==2.31.0", "pysocks==1.7.1"],
            "edges": [["requests[socks]", "pysocks"]], "error": null}"#;

        let solution = interpret(stdout).unwrap();

        assert_eq!(
            solution.decision("requests"),
            Some(&ArtifactId::new("requests", "2.31.0"))
        );
        assert_eq!(solution.dependencies_of("requests"), ["pysocks"]);
    }

    #[rstest]
    #[case("[]")]
    #[case(r#"{"decisions": ["a>=1.0"], "error": null}"#)]
    #[case(r#"{"decisions": 3, "error": null}"#)]
    #[case("not json")]
    fn malformed_reports_are_rejected(#[case] stdout: &str) {
        assert!(matches!(interpret(stdout), Err(SolveError::Malformed(_))));
    }

    #[rstest]
    #[case("ERROR: Failed to download/build wheel for lxml==4.9.0", Some("lxml"))]
    #[case("RuntimeError: Failed to download/build wheel for 'psycopg2'", Some("psycopg2"))]
    #[case("Failed to download/build wheel", Some("unknown"))]
    #[case("ResolutionImpossible: a==1 conflicts with b", None)]
    fn recognises_wheel_failures(#[case] message: &str, #[case] expected: Option<&str>) {
        assert_eq!(unavailable_package(message).as_deref(), expected);
    }

    #[tokio::test]
    async fn runs_the_embedded_script_with_index_and_package() {
        use std::os::unix::fs::PermissionsExt;

        // stands in for python: checks its argv and prints a canned report
        let tmp = tempfile::tempdir().unwrap();
        let python = tmp.path().join("python");
        std::fs::write(
            &python,
            "#!/bin/sh\n\
             [ \"$1\" = -c ] || exit 9\n\
             [ \"$3\" = https://mirror.example/simple/ ] || exit 9\n\
             echo '{\"decisions\": [\"'\"$4\"'==1.0\"], \"edges\": [], \"error\": null}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();
        let solver = PipgripSolver::new(python.display().to_string(), "https://mirror.example/simple/");

        let solution = solver.solve(&PackageName::new("six").unwrap()).await.unwrap();

        assert_eq!(solution.decision("six"), Some(&ArtifactId::new("six", "1.0")));
    }
}
