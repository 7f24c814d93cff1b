//! InstallPlan: dependency-first artifact order with the target last.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::package::ArtifactId;
use crate::error::PlanError;

/// Ordered list of artifacts to fetch and install.
///
/// Invariants (enforced by [`InstallPlan::new`]):
/// - no duplicate artifacts
/// - the target appears exactly once, as the last element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    artifacts: Vec<ArtifactId>,
}

impl InstallPlan {
    pub fn new(artifacts: Vec<ArtifactId>) -> Result<Self, PlanError> {
        let Some(target) = artifacts.last() else {
            return Err(PlanError::Empty);
        };

        let target_key = target.key().0;
        let occurrences = artifacts
            .iter()
            .filter(|a| a.key().0 == target_key)
            .count();
        if occurrences != 1 {
            return Err(PlanError::TargetNotUnique(target.name.clone()));
        }

        let mut seen = HashSet::with_capacity(artifacts.len());
        for a in &artifacts {
            if !seen.insert(a.key()) {
                return Err(PlanError::Duplicate(a.to_string()));
            }
        }

        Ok(Self { artifacts })
    }

    /// The package being analysed.
    pub fn target(&self) -> &ArtifactId {
        // new() rejects empty plans
        &self.artifacts[self.artifacts.len() - 1]
    }

    /// Everything before the target, dependency-first.
    pub fn dependencies(&self) -> &[ArtifactId] {
        &self.artifacts[..self.artifacts.len() - 1]
    }

    pub fn artifacts(&self) -> &[ArtifactId] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Contents of the dependency manifest handed to the sandbox.
    pub fn dependency_manifest(&self) -> String {
        self.dependencies()
            .iter()
            .map(ArtifactId::requirement)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Contents of the target-only manifest handed to the sandbox.
    pub fn target_manifest(&self) -> String {
        self.target().requirement()
    }
}

impl<'de> Deserialize<'de> for InstallPlan {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            artifacts: Vec<ArtifactId>,
        }
        let raw = Raw::deserialize(deserializer)?;
        InstallPlan::new(raw.artifacts).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(name: &str) -> ArtifactId {
        ArtifactId::new(name, "1.0")
    }

    #[test]
    fn splits_dependencies_and_target() {
        let plan = InstallPlan::new(vec![a("b"), a("c"), a("a")]).unwrap();
        assert_eq!(plan.target().name, "a");
        assert_eq!(plan.dependencies().len(), 2);
        assert_eq!(plan.dependency_manifest(), "b==1.0\nc==1.0");
        assert_eq!(plan.target_manifest(), "a==1.0");
    }

    #[test]
    fn single_element_plan_has_empty_dependency_manifest() {
        let plan = InstallPlan::new(vec![a("solo")]).unwrap();
        assert!(plan.dependencies().is_empty());
        assert_eq!(plan.dependency_manifest(), "");
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(InstallPlan::new(vec![]), Err(PlanError::Empty)));
    }

    #[test]
    fn rejects_duplicates() {
        let err = InstallPlan::new(vec![a("b"), a("b"), a("a")]).unwrap_err();
        assert!(matches!(err, PlanError::Duplicate(_)));
    }

    #[test]
    fn rejects_target_appearing_earlier() {
        let plan = vec![ArtifactId::new("A", "0.9"), a("b"), a("a")];
        let err = InstallPlan::new(plan).unwrap_err();
        assert!(matches!(err, PlanError::TargetNotUnique(_)));
    }

    #[test]
    fn deserialize_revalidates() {
        let json = r#"{"artifacts":[{"name":"x","version":"1"},{"name":"x","version":"1"}]}"#;
        assert!(serde_json::from_str::<InstallPlan>(json).is_err());
    }
}
