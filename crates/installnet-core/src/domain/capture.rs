//! Capture statistics model.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Install phase whose traffic a capture covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Installing the dependency manifest only.
    Dependencies,
    /// Installing the target on top of the already-installed dependencies.
    Package,
}

impl Phase {
    /// Capture file name inside the scratch mount and the output bundle.
    pub fn capture_file(self) -> &'static str {
        match self {
            Phase::Dependencies => "dependencies.pcap",
            Phase::Package => "package.pcap",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Dependencies => f.write_str("dependencies"),
            Phase::Package => f.write_str("package"),
        }
    }
}

/// Display filter applied when reading a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcapFilter {
    /// IP-layer traffic.
    Ip,
    /// DNS queries.
    Dns,
}

impl PcapFilter {
    pub fn expression(self) -> &'static str {
        match self {
            PcapFilter::Ip => "tcp or udp or icmp",
            PcapFilter::Dns => "dns",
        }
    }
}

/// One packet as seen by the capture parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    /// Frame length on the wire.
    pub length: u64,
    /// `dns.qry.name`, when the packet carries one.
    pub dns_query_name: Option<String>,
}

/// Per-capture statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub packet_count: u64,
    pub total_bytes: u64,
    pub dns_names: BTreeSet<String>,
}

impl CaptureStats {
    /// Fold IP-filtered packets into counts and DNS-filtered packets into names.
    pub fn from_packets(ip: &[PacketRecord], dns: &[PacketRecord]) -> Self {
        let packet_count = ip.len() as u64;
        let total_bytes = ip.iter().map(|p| p.length).sum();
        let dns_names = dns
            .iter()
            .filter_map(|p| p.dns_query_name.as_deref())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            packet_count,
            total_bytes,
            dns_names,
        }
    }
}

/// Dependencies-phase and full-phase statistics side by side, unsubtracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficReport {
    pub dependencies_phase: CaptureStats,
    pub full_phase: CaptureStats,
}

/// What the full phase shows beyond the dependency baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub packets: i64,
    pub bytes: i64,
    pub new_dns_names: BTreeSet<String>,
}

impl TrafficReport {
    /// Consumer-side view; the persisted report keeps both raw blocks.
    pub fn package_contribution(&self) -> Contribution {
        let full = &self.full_phase;
        let deps = &self.dependencies_phase;
        Contribution {
            packets: full.packet_count as i64 - deps.packet_count as i64,
            bytes: full.total_bytes as i64 - deps.total_bytes as i64,
            new_dns_names: full.dns_names.difference(&deps.dns_names).cloned().collect(),
        }
    }
}
