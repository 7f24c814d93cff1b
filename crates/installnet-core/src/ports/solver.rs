//! VersionSolver port - 依存解決アルゴリズム（外部コラボレータ）
//!
//! The solving algorithm itself lives outside this crate. The resolver only
//! needs the decisions the solver reached and the dependency edges between
//! them, which is all this port exposes.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{ArtifactId, PackageName, package::normalize};
use crate::error::SolveError;

/// Decisions (pinned artifacts) plus the dependency edges between them.
///
/// Edges are keyed by normalised project name so lookups survive
/// `Foo_Bar` / `foo-bar` spelling differences in metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    decisions: Vec<ArtifactId>,
    edges: HashMap<String, Vec<String>>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision. A second decision for the same project is ignored.
    pub fn decide(&mut self, artifact: ArtifactId) {
        if self.decision(&artifact.name).is_none() {
            self.decisions.push(artifact);
        }
    }

    /// Record that `from` depends on `to`.
    pub fn depend(&mut self, from: &str, to: &str) {
        let deps = self.edges.entry(normalize(from)).or_default();
        let to = normalize(to);
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    pub fn decision(&self, name: &str) -> Option<&ArtifactId> {
        let key = normalize(name);
        self.decisions.iter().find(|a| normalize(&a.name) == key)
    }

    pub fn decisions(&self) -> &[ArtifactId] {
        &self.decisions
    }

    /// Direct dependencies of `name` (normalised names), in metadata order.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges
            .get(&normalize(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// Version solving for one root package.
///
/// Implementations return [`SolveError::ArtifactUnavailable`] with the
/// partial solution when a dependency's artifact cannot be fetched or built;
/// every other failure is reported as-is.
#[async_trait]
pub trait VersionSolver: Send + Sync {
    async fn solve(&self, package: &PackageName) -> Result<Solution, SolveError>;
}
