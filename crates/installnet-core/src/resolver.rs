//! Install plan resolution.
//!
//! # フロー
//! 1. VersionSolver で decisions + edges を得る
//! 2. "artifact を取得/ビルドできない" 失敗なら、そこまでの部分解で続行
//! 3. ターゲットから edges をたどり、post-order（依存が先）で並べる
//!
//! Undecided nodes are never visited, so a dependency whose artifact was
//! unavailable drops out together with its subtree while the rest of the
//! plan survives.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{ArtifactId, InstallPlan, PackageName, package::normalize};
use crate::error::{ResolutionError, SolveError};
use crate::ports::{Solution, VersionSolver};

pub struct PlanResolver {
    solver: Arc<dyn VersionSolver>,
}

impl PlanResolver {
    pub fn new(solver: Arc<dyn VersionSolver>) -> Self {
        Self { solver }
    }

    pub async fn resolve(&self, package: &PackageName) -> Result<InstallPlan, ResolutionError> {
        let solution = match self.solver.solve(package).await {
            Ok(solution) => solution,
            Err(SolveError::ArtifactUnavailable {
                package: dependency,
                message,
                partial,
            }) => {
                tracing::warn!(
                    package = %package,
                    dependency = %dependency,
                    error = %message,
                    decided = partial.decisions().len(),
                    "solver stopped early; continuing with partial solution"
                );
                partial
            }
            Err(e) => return Err(e.into()),
        };

        let plan = build_plan(package, &solution)?;
        tracing::debug!(
            package = %package,
            artifacts = plan.len(),
            "install plan resolved"
        );
        Ok(plan)
    }
}

/// Dependency-first, deduplicated walk from `package` over decided nodes.
pub(crate) fn build_plan(
    package: &PackageName,
    solution: &Solution,
) -> Result<InstallPlan, ResolutionError> {
    if solution.decision(package.as_str()).is_none() {
        return Err(ResolutionError::NoSolution(package.to_string()));
    }

    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(solution.decisions().len());
    visit(package.as_str(), solution, &mut visited, &mut order);

    Ok(InstallPlan::new(order)?)
}

fn visit(
    name: &str,
    solution: &Solution,
    visited: &mut HashSet<String>,
    order: &mut Vec<ArtifactId>,
) {
    let Some(artifact) = solution.decision(name) else {
        return;
    };
    // 入った時点で印を付ける（循環があっても 1 回だけ出力）
    if !visited.insert(normalize(name)) {
        return;
    }
    for dep in solution.dependencies_of(name) {
        visit(dep, solution, visited, order);
    }
    order.push(artifact.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeSolver {
        result: fn() -> Result<Solution, SolveError>,
    }

    #[async_trait]
    impl VersionSolver for FakeSolver {
        async fn solve(&self, _package: &PackageName) -> Result<Solution, SolveError> {
            (self.result)()
        }
    }

    fn resolver(result: fn() -> Result<Solution, SolveError>) -> PlanResolver {
        PlanResolver::new(Arc::new(FakeSolver { result }))
    }

    fn pkg(name: &str) -> PackageName {
        PackageName::new(name).unwrap()
    }

    fn names(plan: &InstallPlan) -> Vec<&str> {
        plan.artifacts().iter().map(|a| a.name.as_str()).collect()
    }

    /// a -> b -> d, a -> c -> d
    fn diamond() -> Solution {
        let mut s = Solution::new();
        for n in ["a", "b", "c", "d"] {
            s.decide(ArtifactId::new(n, "1.0"));
        }
        s.depend("a", "b");
        s.depend("a", "c");
        s.depend("b", "d");
        s.depend("c", "d");
        s
    }

    #[tokio::test]
    async fn orders_dependencies_first_and_dedups() {
        let plan = resolver(|| Ok(diamond())).resolve(&pkg("a")).await.unwrap();
        assert_eq!(names(&plan), vec!["d", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn partial_solution_omits_only_unreachable_subtree() {
        // a -> b -> e, a -> c; c's artifact could not be built, so the
        // solver never decided c (nor anything only c pulls in).
        fn partial() -> Result<Solution, SolveError> {
            let mut s = Solution::new();
            s.decide(ArtifactId::new("a", "1.0"));
            s.decide(ArtifactId::new("b", "2.0"));
            s.decide(ArtifactId::new("e", "0.3"));
            s.depend("a", "b");
            s.depend("a", "c");
            s.depend("b", "e");
            s.depend("c", "f");
            Err(SolveError::ArtifactUnavailable {
                package: "c".into(),
                message: "Failed to download/build wheel for c".into(),
                partial: s,
            })
        }

        let plan = resolver(partial).resolve(&pkg("a")).await.unwrap();
        assert_eq!(names(&plan), vec!["e", "b", "a"]);
        assert_eq!(plan.target().name, "a");
    }

    #[tokio::test]
    async fn other_solver_failures_are_reraised() {
        let err = resolver(|| Err(SolveError::Failed("index unreachable".into())))
            .resolve(&pkg("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Solver(SolveError::Failed(_))));
    }

    #[tokio::test]
    async fn unknown_package_has_no_solution() {
        fn empty_partial() -> Result<Solution, SolveError> {
            Err(SolveError::ArtifactUnavailable {
                package: "nope".into(),
                message: "no matching distribution".into(),
                partial: Solution::new(),
            })
        }
        let err = resolver(empty_partial).resolve(&pkg("nope")).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NoSolution(_)));
    }

    #[tokio::test]
    async fn cycles_are_emitted_once() {
        fn cyclic() -> Result<Solution, SolveError> {
            let mut s = Solution::new();
            s.decide(ArtifactId::new("a", "1"));
            s.decide(ArtifactId::new("b", "1"));
            s.depend("a", "b");
            s.depend("b", "a");
            Ok(s)
        }
        let plan = resolver(cyclic).resolve(&pkg("a")).await.unwrap();
        assert_eq!(names(&plan), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn target_lookup_uses_normalized_names() {
        fn spelled() -> Result<Solution, SolveError> {
            let mut s = Solution::new();
            s.decide(ArtifactId::new("Flask_Cors", "4.0"));
            s.decide(ArtifactId::new("six", "1.16"));
            s.depend("flask-cors", "six");
            Ok(s)
        }
        let plan = resolver(spelled).resolve(&pkg("flask-cors")).await.unwrap();
        assert_eq!(names(&plan), vec!["six", "Flask_Cors"]);
    }
}
