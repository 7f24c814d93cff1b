//! Package names and artifact identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PackageNameError;

/// A registry package name.
///
/// The name doubles as a directory name under the cache and output roots, so
/// anything that could escape those roots is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    pub fn new(s: impl Into<String>) -> Result<Self, PackageNameError> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PackageNameError::Empty);
        }
        if trimmed == "." || trimmed == ".." {
            return Err(PackageNameError::Invalid(trimmed.to_string()));
        }
        if trimmed
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
        {
            return Err(PackageNameError::Invalid(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// PEP 503 normalised form: lowercase, runs of `-`, `_`, `.` collapsed to `-`.
    pub fn normalized(&self) -> String {
        normalize(&self.0)
    }

    /// Same project under the registry's name normalisation.
    pub fn same_project(&self, other: &str) -> bool {
        self.normalized() == normalize(other)
    }
}

pub(crate) fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_sep {
                out.push('-');
            }
            in_sep = true;
        } else {
            out.extend(c.to_lowercase());
            in_sep = false;
        }
    }
    out
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PackageName {
    type Err = PackageNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PackageName {
    type Error = PackageNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> Self {
        name.0
    }
}

/// One downloadable distribution: a package pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
    pub name: String,
    pub version: String,
}

impl ArtifactId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Requirement line understood by the installer (`name==version`).
    pub fn requirement(&self) -> String {
        format!("{}=={}", self.name, self.version)
    }

    /// Identity key used for dedup (normalised name + version).
    pub(crate) fn key(&self) -> (String, String) {
        (normalize(&self.name), self.version.clone())
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}
