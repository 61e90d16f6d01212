use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use serde::Serialize;

use crate::error::ScanError;

/// A scan target: the name the user gave and the IPv4 address it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub host: String,
    pub ip: Ipv4Addr,
}

impl Target {
    pub fn new(host: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self { host: host.into(), ip }
    }

    /// Accepts a dotted IPv4 literal or a hostname. Hostnames go through the
    /// system resolver and the first IPv4 answer wins.
    pub fn resolve(host: &str) -> Result<Self, ScanError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ScanError::Resolve {
                host: host.to_string(),
                reason: "empty target".to_string(),
            });
        }

        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => return Ok(Self::new(host, ip)),
            Ok(IpAddr::V6(_)) => {
                return Err(ScanError::Resolve {
                    host: host.to_string(),
                    reason: "IPv6 targets are not supported".to_string(),
                })
            }
            Err(_) => {}
        }

        let addrs = format!("{}:0", host)
            .to_socket_addrs()
            .map_err(|e| ScanError::Resolve {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .next()
            .map(|ip| Self::new(host, ip))
            .ok_or_else(|| ScanError::Resolve {
                host: host.to_string(),
                reason: "no IPv4 address found".to_string(),
            })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host == self.ip.to_string() {
            write!(f, "{}", self.ip)
        } else {
            write!(f, "{} ({})", self.host, self.ip)
        }
    }
}
