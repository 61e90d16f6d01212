use crate::error::ScanError;

/// Ports of the classic half-open scan target list.
pub const COMMON_PORTS: &[u16] = &[21, 22, 23, 25, 53, 80, 110, 143, 443, 1433, 3306];

pub const WEB_PORTS: &[u16] = &[80, 443, 8000, 8080, 8443];

pub const TOP_20_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900,
    8080,
];

/// Parse a port specification into an ordered list.
///
/// Accepts single ports (`80`), ranges (`1-1024`), the named lists `common`,
/// `web` and `top20`, and any comma-separated mix of them. Order and
/// duplicates are kept exactly as written.
pub fn parse_ports(spec: &str) -> Result<Vec<u16>, ScanError> {
    let mut ports = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        match part.to_ascii_lowercase().as_str() {
            "common" => ports.extend_from_slice(COMMON_PORTS),
            "web" => ports.extend_from_slice(WEB_PORTS),
            "top20" => ports.extend_from_slice(TOP_20_PORTS),
            _ => {
                if let Some((start, end)) = part.split_once('-') {
                    let start = parse_port(start)?;
                    let end = parse_port(end)?;
                    if start > end {
                        return Err(ScanError::InvalidPortSpec(format!(
                            "range start {} is greater than end {}",
                            start, end
                        )));
                    }
                    ports.extend(start..=end);
                } else {
                    ports.push(parse_port(part)?);
                }
            }
        }
    }

    if ports.is_empty() {
        return Err(ScanError::InvalidPortSpec(format!("no ports in '{}'", spec)));
    }
    Ok(ports)
}

fn parse_port(text: &str) -> Result<u16, ScanError> {
    let text = text.trim();
    let port: u16 = text
        .parse()
        .map_err(|_| ScanError::InvalidPortSpec(format!("'{}' is not a port number", text)))?;
    if port == 0 {
        return Err(ScanError::InvalidPort(0));
    }
    Ok(port)
}

/// Well-known service name for display, if any.
pub fn service_name(port: u16) -> Option<&'static str> {
    let name = match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 => "http",
        110 => "pop3",
        111 => "rpcbind",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        443 => "https",
        445 => "microsoft-ds",
        993 => "imaps",
        995 => "pop3s",
        1433 => "ms-sql-s",
        1723 => "pptp",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5432 => "postgresql",
        5900 => "vnc",
        6379 => "redis",
        8000 => "http-alt",
        8080 => "http-proxy",
        8443 => "https-alt",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_list() {
        assert_eq!(parse_ports("80").unwrap(), vec![80]);
        assert_eq!(parse_ports("443, 80,22").unwrap(), vec![443, 80, 22]);
    }

    #[test]
    fn test_duplicates_kept() {
        assert_eq!(parse_ports("80,22,80").unwrap(), vec![80, 22, 80]);
    }

    #[test]
    fn test_range() {
        assert_eq!(parse_ports("20-23").unwrap(), vec![20, 21, 22, 23]);
        assert_eq!(parse_ports("65535").unwrap(), vec![65535]);
        assert!(parse_ports("30-20").is_err());
    }

    #[test]
    fn test_named_lists() {
        assert_eq!(parse_ports("common").unwrap(), COMMON_PORTS.to_vec());
        let mixed = parse_ports("9999,web").unwrap();
        assert_eq!(mixed[0], 9999);
        assert_eq!(&mixed[1..], WEB_PORTS);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(parse_ports("0"), Err(ScanError::InvalidPort(0))));
        assert!(matches!(parse_ports("65536"), Err(ScanError::InvalidPortSpec(_))));
        assert!(matches!(parse_ports("http"), Err(ScanError::InvalidPortSpec(_))));
        assert!(matches!(parse_ports(" , "), Err(ScanError::InvalidPortSpec(_))));
    }

    #[test]
    fn test_service_names() {
        assert_eq!(service_name(22), Some("ssh"));
        assert_eq!(service_name(9999), None);
    }
}
