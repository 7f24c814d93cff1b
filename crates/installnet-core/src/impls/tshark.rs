//! TsharkParser - `tshark -T fields` で pcap を読む CaptureParser
//!
//! tshark が signal で落ちた場合や、異常終了した場合は `ParseError::Crashed`。

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::{PacketRecord, PcapFilter};
use crate::error::ParseError;
use crate::impls::stderr_tail;
use crate::ports::CaptureParser;

pub struct TsharkParser {
    program: String,
}

impl TsharkParser {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn args(capture: &Path, filter: PcapFilter) -> Vec<String> {
    vec![
        "-n".into(),
        "-r".into(),
        capture.display().to_string(),
        "-Y".into(),
        filter.expression().into(),
        "-T".into(),
        "fields".into(),
        "-E".into(),
        "separator=/t".into(),
        "-E".into(),
        "occurrence=f".into(),
        "-e".into(),
        "frame.len".into(),
        "-e".into(),
        "dns.qry.name".into(),
    ]
}

/// One `frame.len<TAB>dns.qry.name` line per packet.
pub(crate) fn parse_fields(stdout: &str) -> Vec<PacketRecord> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let length = fields.next()?.trim().parse().ok()?;
            let dns_query_name = fields
                .next()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            Some(PacketRecord {
                length,
                dns_query_name,
            })
        })
        .collect()
}

#[async_trait]
impl CaptureParser for TsharkParser {
    async fn read(
        &self,
        capture: &Path,
        filter: PcapFilter,
    ) -> Result<Vec<PacketRecord>, ParseError> {
        if !capture.is_file() {
            return Err(ParseError::NotFound(capture.to_path_buf()));
        }

        let output = Command::new(&self.program)
            .args(args(capture, filter))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ParseError::Spawn(format!("{}: {e}", self.program)))?;

        match output.status.code() {
            Some(0) => Ok(parse_fields(&String::from_utf8_lossy(&output.stdout))),
            Some(code) => Err(ParseError::Crashed(format!(
                "exit {code}: {}",
                stderr_tail(&output.stderr)
            ))),
            None => Err(ParseError::Crashed(format!(
                "killed by signal: {}",
                stderr_tail(&output.stderr)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lengths_and_query_names() {
        let stdout = "60\t\n74\tcdn.example.com\n\n1514\t\ngarbage\n";

        let packets = parse_fields(stdout);

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].length, 60);
        assert_eq!(packets[0].dns_query_name, None);
        assert_eq!(packets[1].dns_query_name.as_deref(), Some("cdn.example.com"));
        assert_eq!(packets[2].length, 1514);
    }

    #[test]
    fn uses_the_filter_expression() {
        let args = args(Path::new("/out/package.pcap"), PcapFilter::Ip);
        assert!(args.windows(2).any(|w| w == ["-Y", "tcp or udp or icmp"]));
        assert!(args.windows(2).any(|w| w == ["-r", "/out/package.pcap"]));
    }

    #[tokio::test]
    async fn missing_file_is_not_found_without_running_tshark() {
        let parser = TsharkParser::new("installnet-no-such-tshark");
        let err = parser
            .read(Path::new("/nonexistent/package.pcap"), PcapFilter::Dns)
            .await
            .unwrap_err();
        assert_eq!(err, ParseError::NotFound("/nonexistent/package.pcap".into()));
    }
}
