//! Offline re-analysis of persisted bundles.
//!
//! Runs the traffic differ over every `output_root/<package>/` that holds
//! captures, without touching `result.json`. Used by `installnet analyze`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Contribution, Phase, TrafficReport};
use crate::error::{DiffError, StoreError};
use crate::store::ResultStore;
use crate::traffic::TrafficDiffer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleAnalysis {
    Parsed {
        report: TrafficReport,
        contribution: Contribution,
    },
    Unparseable {
        attempts: u32,
        detail: String,
    },
    MissingCapture {
        path: String,
    },
    Error {
        detail: String,
    },
}

impl BundleAnalysis {
    pub fn status(&self) -> &'static str {
        match self {
            BundleAnalysis::Parsed { .. } => "parsed",
            BundleAnalysis::Unparseable { .. } => "unparseable",
            BundleAnalysis::MissingCapture { .. } => "missing_capture",
            BundleAnalysis::Error { .. } => "error",
        }
    }
}

impl From<Result<TrafficReport, DiffError>> for BundleAnalysis {
    fn from(diffed: Result<TrafficReport, DiffError>) -> Self {
        match diffed {
            Ok(report) => BundleAnalysis::Parsed {
                contribution: report.package_contribution(),
                report,
            },
            Err(DiffError::Unparseable { attempts, message }) => BundleAnalysis::Unparseable {
                attempts,
                detail: message,
            },
            Err(DiffError::MissingCapture(path)) => BundleAnalysis::MissingCapture {
                path: path.display().to_string(),
            },
            Err(e) => BundleAnalysis::Error {
                detail: e.to_string(),
            },
        }
    }
}

/// Per-package analysis keyed by package name, in name order.
pub async fn reanalyze(
    store: &ResultStore,
    differ: &TrafficDiffer,
) -> Result<BTreeMap<String, BundleAnalysis>, StoreError> {
    let mut out = BTreeMap::new();
    for (package, dir) in store.bundles().await? {
        let diffed = differ
            .diff(
                &dir.join(Phase::Dependencies.capture_file()),
                &dir.join(Phase::Package.capture_file()),
            )
            .await;
        let analysis = BundleAnalysis::from(diffed);
        tracing::info!(package = %package, status = analysis.status(), "bundle analysed");
        out.insert(package.to_string(), analysis);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::traffic::tests::example_parser;
    use std::sync::Arc;

    #[tokio::test]
    async fn analyses_every_bundle_with_captures() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["good", "empty"] {
            std::fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        for file in ["dependencies.pcap", "package.pcap"] {
            std::fs::write(tmp.path().join("good").join(file), b"pcap").unwrap();
        }
        let store = ResultStore::new(tmp.path());
        let differ = TrafficDiffer::new(Arc::new(example_parser(0)), RetryPolicy::immediate(2));

        let analysed = reanalyze(&store, &differ).await.unwrap();

        assert_eq!(analysed.len(), 2);
        assert!(matches!(analysed["empty"], BundleAnalysis::MissingCapture { .. }));
        let BundleAnalysis::Parsed { report, contribution } = &analysed["good"] else {
            panic!("expected parsed, got {:?}", analysed["good"]);
        };
        assert_eq!(report.full_phase.packet_count, 40);
        assert_eq!(contribution.packets, 28);
        assert!(contribution.new_dns_names.contains("evil.example.net"));

        let json = serde_json::to_value(&analysed).unwrap();
        assert_eq!(json["good"]["status"], "parsed");
        assert_eq!(json["empty"]["status"], "missing_capture");
    }
}
