use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transport::ResponseFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortVerdict {
    Open,
    Closed,
    Filtered,
}

impl fmt::Display for PortVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortVerdict::Open => write!(f, "open"),
            PortVerdict::Closed => write!(f, "closed"),
            PortVerdict::Filtered => write!(f, "filtered"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortResult {
    pub port: u16,
    pub verdict: PortVerdict,
    /// Flags of the matched response, absent when nothing answered.
    pub flags: Option<ResponseFlags>,
    pub rtt_ms: Option<f64>,
    pub attempts: u32,
}

impl PortResult {
    /// Verdict for a port that never produced a usable response.
    pub fn filtered(port: u16, attempts: u32) -> Self {
        Self {
            port,
            verdict: PortVerdict::Filtered,
            flags: None,
            rtt_ms: None,
            attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub target: String,
    pub target_ip: Ipv4Addr,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// One entry per requested port, in request order.
    pub ports: Vec<PortResult>,
}

impl ScanResult {
    pub fn count(&self, verdict: PortVerdict) -> usize {
        self.ports.iter().filter(|p| p.verdict == verdict).count()
    }

    /// `(port, verdict)` pairs in request order.
    pub fn verdicts(&self) -> Vec<(u16, PortVerdict)> {
        self.ports.iter().map(|p| (p.port, p.verdict)).collect()
    }
}
