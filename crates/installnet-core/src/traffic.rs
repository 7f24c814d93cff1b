//! Traffic differ: packet/byte counts and DNS names per install phase.
//!
//! Each phase capture is read twice: once with the IP-layer filter (counts
//! and bytes) and once with the DNS filter (query names). The two phase
//! blocks are reported side by side; subtracting them is up to the reader.
//!
//! # クラッシュ時の扱い
//! - パーサのクラッシュは「想定内の失敗」。4 回の読み取りをまとめて 1 試行とし、
//!   RetryPolicy の上限（既定: 1 回だけリトライ）まで繰り返す
//! - キャプチャファイルが無いのは別扱い（リトライしない）

use std::path::Path;
use std::sync::Arc;

use crate::domain::{CaptureStats, PcapFilter, TrafficReport};
use crate::error::{DiffError, ParseError};
use crate::ports::CaptureParser;
use crate::retry::RetryPolicy;

pub struct TrafficDiffer {
    parser: Arc<dyn CaptureParser>,
    retry: RetryPolicy,
}

impl TrafficDiffer {
    pub fn new(parser: Arc<dyn CaptureParser>, retry: RetryPolicy) -> Self {
        Self { parser, retry }
    }

    /// Statistics of `capture` under a single filter.
    pub async fn stats(&self, capture: &Path, filter: PcapFilter) -> Result<CaptureStats, ParseError> {
        let packets = self.parser.read(capture, filter).await?;
        Ok(CaptureStats::from_packets(&packets, &packets))
    }

    /// Counts from the IP filter, names from the DNS filter.
    pub async fn phase_stats(&self, capture: &Path) -> Result<CaptureStats, ParseError> {
        let ip = self.stats(capture, PcapFilter::Ip).await?;
        let dns = self.stats(capture, PcapFilter::Dns).await?;
        Ok(CaptureStats {
            packet_count: ip.packet_count,
            total_bytes: ip.total_bytes,
            dns_names: dns.dns_names,
        })
    }

    pub async fn diff(&self, dependencies: &Path, package: &Path) -> Result<TrafficReport, DiffError> {
        for capture in [dependencies, package] {
            if !capture.is_file() {
                return Err(DiffError::MissingCapture(capture.to_path_buf()));
            }
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(dependencies, package).await {
                Ok(report) => return Ok(report),
                Err(ParseError::Crashed(message)) => {
                    if self.retry.allows_retry(attempts) {
                        tracing::warn!(
                            capture = %package.display(),
                            attempts,
                            error = %message,
                            "retrying after capture parser crash"
                        );
                        tokio::time::sleep(self.retry.next_delay(attempts)).await;
                        continue;
                    }
                    tracing::warn!(
                        capture = %package.display(),
                        attempts,
                        error = %message,
                        "skipping after repeated capture parser crash"
                    );
                    return Err(DiffError::Unparseable { attempts, message });
                }
                Err(ParseError::NotFound(path)) => return Err(DiffError::MissingCapture(path)),
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn attempt(&self, dependencies: &Path, package: &Path) -> Result<TrafficReport, ParseError> {
        let full_phase = self.phase_stats(package).await?;
        let dependencies_phase = self.phase_stats(dependencies).await?;
        Ok(TrafficReport {
            dependencies_phase,
            full_phase,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::PacketRecord;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Canned packets per capture file name; crashes on the first
    /// `crashes` reads.
    pub(crate) struct FakeParser {
        pub packets: HashMap<String, (Vec<PacketRecord>, Vec<PacketRecord>)>,
        pub crashes: AtomicU32,
        pub reads: AtomicU32,
    }

    impl FakeParser {
        pub(crate) fn new(crashes: u32) -> Self {
            Self {
                packets: HashMap::new(),
                crashes: AtomicU32::new(crashes),
                reads: AtomicU32::new(0),
            }
        }

        /// `packets` IP packets of `bytes_each` plus one DNS query per name.
        pub(crate) fn with_capture(
            mut self,
            file: &str,
            packets: usize,
            bytes_each: u64,
            dns: &[&str],
        ) -> Self {
            let ip = (0..packets)
                .map(|_| PacketRecord {
                    length: bytes_each,
                    dns_query_name: None,
                })
                .collect();
            let mut dns_packets: Vec<PacketRecord> = dns
                .iter()
                .map(|n| PacketRecord {
                    length: 80,
                    dns_query_name: Some(n.to_string()),
                })
                .collect();
            // a DNS-filter match without a query name (e.g. a malformed response)
            dns_packets.push(PacketRecord {
                length: 90,
                dns_query_name: None,
            });
            self.packets.insert(file.to_string(), (ip, dns_packets));
            self
        }
    }

    #[async_trait]
    impl CaptureParser for FakeParser {
        async fn read(
            &self,
            capture: &Path,
            filter: PcapFilter,
        ) -> Result<Vec<PacketRecord>, ParseError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let left = self.crashes.load(Ordering::SeqCst);
            if left > 0 {
                self.crashes.fetch_sub(1, Ordering::SeqCst);
                return Err(ParseError::Crashed("tshark: segmentation fault".into()));
            }
            let name = capture.file_name().unwrap().to_string_lossy().to_string();
            let Some((ip, dns)) = self.packets.get(&name) else {
                return Err(ParseError::NotFound(capture.to_path_buf()));
            };
            Ok(match filter {
                PcapFilter::Ip => ip.clone(),
                PcapFilter::Dns => dns.clone(),
            })
        }
    }

    pub(crate) fn example_parser(crashes: u32) -> FakeParser {
        FakeParser::new(crashes)
            .with_capture("dependencies.pcap", 12, 100, &["cdn.example.com"])
            .with_capture(
                "package.pcap",
                40,
                100,
                &["cdn.example.com", "evil.example.net"],
            )
    }

    fn captures() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let deps = tmp.path().join("dependencies.pcap");
        let pkg = tmp.path().join("package.pcap");
        std::fs::write(&deps, b"x").unwrap();
        std::fs::write(&pkg, b"x").unwrap();
        (tmp, deps, pkg)
    }

    #[tokio::test]
    async fn reports_both_phases_unsubtracted() {
        let (_tmp, deps, pkg) = captures();
        let differ = TrafficDiffer::new(Arc::new(example_parser(0)), RetryPolicy::immediate(2));

        let report = differ.diff(&deps, &pkg).await.unwrap();

        assert_eq!(report.dependencies_phase.packet_count, 12);
        assert_eq!(report.dependencies_phase.total_bytes, 1200);
        assert_eq!(report.dependencies_phase.dns_names.len(), 1);
        assert_eq!(report.full_phase.packet_count, 40);
        assert_eq!(report.full_phase.total_bytes, 4000);
        assert!(report.full_phase.dns_names.contains("evil.example.net"));
        assert!(report.full_phase.dns_names.contains("cdn.example.com"));
    }

    #[tokio::test]
    async fn one_crash_then_success_yields_full_result() {
        let (_tmp, deps, pkg) = captures();
        let differ = TrafficDiffer::new(Arc::new(example_parser(1)), RetryPolicy::immediate(2));

        let report = differ.diff(&deps, &pkg).await.unwrap();
        assert_eq!(report.full_phase.packet_count, 40);
    }

    #[tokio::test]
    async fn persistent_crash_retries_exactly_once() {
        let (_tmp, deps, pkg) = captures();
        let parser = Arc::new(example_parser(u32::MAX));
        let differ = TrafficDiffer::new(parser.clone(), RetryPolicy::immediate(2));

        let err = differ.diff(&deps, &pkg).await.unwrap_err();

        assert!(matches!(err, DiffError::Unparseable { attempts: 2, .. }));
        // each attempt dies on its first read
        assert_eq!(parser.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_capture_is_not_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = Arc::new(example_parser(0));
        let differ = TrafficDiffer::new(parser.clone(), RetryPolicy::immediate(2));

        let err = differ
            .diff(&tmp.path().join("dependencies.pcap"), &tmp.path().join("package.pcap"))
            .await
            .unwrap_err();

        assert!(matches!(err, DiffError::MissingCapture(_)));
        assert_eq!(parser.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dns_filter_alone_counts_dns_packets() {
        let (_tmp, _deps, pkg) = captures();
        let differ = TrafficDiffer::new(Arc::new(example_parser(0)), RetryPolicy::immediate(2));

        let stats = differ.stats(&pkg, PcapFilter::Dns).await.unwrap();
        assert_eq!(stats.packet_count, 3);
        assert_eq!(stats.dns_names.len(), 2);
    }
}
