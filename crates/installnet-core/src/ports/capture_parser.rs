//! CaptureParser port - pcap の読み取り
//!
//! 実装（tshark）はときどきクラッシュする。それは `ParseError::Crashed`
//! として返し、リトライ判断は TrafficDiffer が行う。

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{PacketRecord, PcapFilter};
use crate::error::ParseError;

#[async_trait]
pub trait CaptureParser: Send + Sync {
    /// Every packet of `capture` that matches `filter`.
    async fn read(&self, capture: &Path, filter: PcapFilter)
    -> Result<Vec<PacketRecord>, ParseError>;
}
