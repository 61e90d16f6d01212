use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::*;

use crate::cli::OutputFormat;
use crate::scanner::{PortResult, PortVerdict, ScanResult};
use crate::utils::service_name;

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
    color: bool,
    verbose: bool,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Self {
        Self {
            format,
            file,
            color: true,
            verbose: false,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn write(&self, result: &ScanResult) -> Result<()> {
        let output = self.render(result)?;

        match &self.file {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }

        Ok(())
    }

    pub fn render(&self, result: &ScanResult) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(self.format_human(result)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(result)? + "\n"),
            OutputFormat::Csv => Ok(format_csv(result)),
            OutputFormat::Xml => Ok(format_xml(result)),
        }
    }

    fn format_human(&self, result: &ScanResult) -> String {
        let mut output = String::new();

        let target = if result.target == result.target_ip.to_string() {
            result.target.clone()
        } else {
            format!("{} ({})", result.target, result.target_ip)
        };
        let header = format!("SYN scan of {}", target);
        output.push_str(&format!("{}\n", self.paint(&header, |s| s.bold())));

        for port in &result.ports {
            output.push_str(&self.port_line(port));
            output.push('\n');
        }

        let elapsed = (result.end_time - result.start_time).num_milliseconds();
        output.push_str(&format!(
            "{} ports scanned in {}ms: {} open, {} closed, {} filtered\n",
            result.ports.len(),
            elapsed,
            result.count(PortVerdict::Open),
            result.count(PortVerdict::Closed),
            result.count(PortVerdict::Filtered),
        ));

        output
    }

    fn port_line(&self, port: &PortResult) -> String {
        let state = match port.verdict {
            PortVerdict::Open => self.paint("open", |s| s.truecolor(0, 255, 65).bold()),
            PortVerdict::Closed => self.paint("closed", |s| s.truecolor(255, 0, 81)),
            PortVerdict::Filtered => self.paint("filtered", |s| s.truecolor(255, 140, 0)),
        };
        let mut line = format!("{}: {}", port.port, state);

        if self.verbose {
            match port.flags {
                Some(flags) => line.push_str(&format!(" ({} received)", flags)),
                None => line.push_str(" (no response)"),
            }
            if let Some(service) = service_name(port.port) {
                line.push_str(&format!(" [{}]", service));
            }
        }
        line
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }
}

fn format_csv(result: &ScanResult) -> String {
    let mut csv = String::new();
    csv.push_str("target,target_ip,port,state,flags\n");

    for port in &result.ports {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            result.target,
            result.target_ip,
            port.port,
            port.verdict,
            port.flags.map(|f| f.to_string()).unwrap_or_default()
        ));
    }

    csv
}

fn format_xml(result: &ScanResult) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<nmaprun scanner=\"synscan\" start=\"{}\">\n",
        result.start_time.timestamp()
    ));
    xml.push_str("  <scaninfo type=\"syn\" protocol=\"tcp\"/>\n");
    xml.push_str("  <host>\n");
    xml.push_str(&format!(
        "    <address addr=\"{}\" addrtype=\"ipv4\"/>\n",
        result.target_ip
    ));
    if result.target != result.target_ip.to_string() {
        xml.push_str(&format!(
            "    <hostnames><hostname name=\"{}\" type=\"user\"/></hostnames>\n",
            escape_xml(&result.target)
        ));
    }
    xml.push_str("    <ports>\n");

    for port in &result.ports {
        xml.push_str(&format!("      <port protocol=\"tcp\" portid=\"{}\">\n", port.port));
        xml.push_str(&format!(
            "        <state state=\"{}\" reason=\"{}\"/>\n",
            port.verdict,
            xml_reason(port)
        ));
        xml.push_str("      </port>\n");
    }

    xml.push_str("    </ports>\n");
    xml.push_str("  </host>\n");
    xml.push_str(&format!(
        "  <runstats><finished time=\"{}\"/></runstats>\n",
        result.end_time.timestamp()
    ));
    xml.push_str("</nmaprun>\n");
    xml
}

fn xml_reason(port: &PortResult) -> &'static str {
    match port.flags {
        Some(flags) if flags.rst() => "reset",
        Some(flags) if flags.syn() && flags.ack() => "syn-ack",
        Some(flags) if flags.syn() => "syn",
        Some(_) => "unexpected",
        None => "no-response",
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ResponseFlags;
    use chrono::{Duration, TimeZone, Utc};
    use std::net::Ipv4Addr;

    fn sample() -> ScanResult {
        let start_time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ScanResult {
            target: "scanme.example".to_string(),
            target_ip: Ipv4Addr::new(203, 0, 113, 5),
            start_time,
            end_time: start_time + Duration::milliseconds(1500),
            ports: vec![
                PortResult {
                    port: 22,
                    verdict: PortVerdict::Closed,
                    flags: Some(ResponseFlags::RST_ACK),
                    rtt_ms: Some(3.2),
                    attempts: 1,
                },
                PortResult {
                    port: 80,
                    verdict: PortVerdict::Open,
                    flags: Some(ResponseFlags::SYN_ACK),
                    rtt_ms: Some(2.5),
                    attempts: 1,
                },
                PortResult::filtered(9999, 2),
            ],
        }
    }

    fn plain(format: OutputFormat) -> OutputWriter {
        OutputWriter::new(format, None).with_color(false)
    }

    #[test]
    fn test_human_lines() {
        let text = plain(OutputFormat::Human).render(&sample()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "SYN scan of scanme.example (203.0.113.5)");
        assert_eq!(&lines[1..4], &["22: closed", "80: open", "9999: filtered"]);
        assert_eq!(lines[4], "3 ports scanned in 1500ms: 1 open, 1 closed, 1 filtered");
    }

    #[test]
    fn test_human_verbose_shows_flags() {
        let writer = plain(OutputFormat::Human).with_verbose(true);
        let text = writer.render(&sample()).unwrap();

        assert!(text.contains("22: closed (RA received) [ssh]"));
        assert!(text.contains("80: open (SA received) [http]"));
        assert!(text.contains("9999: filtered (no response)"));
    }

    #[test]
    fn test_json() {
        let text = plain(OutputFormat::Json).render(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["target_ip"], "203.0.113.5");
        assert_eq!(value["ports"][1]["verdict"], "open");
        assert_eq!(value["ports"][1]["flags"], "SA");
        assert!(value["ports"][2]["flags"].is_null());
        assert_eq!(value["ports"][2]["attempts"], 2);
    }

    #[test]
    fn test_csv() {
        let text = plain(OutputFormat::Csv).render(&sample()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "target,target_ip,port,state,flags");
        assert_eq!(lines[1], "scanme.example,203.0.113.5,22,closed,RA");
        assert_eq!(lines[3], "scanme.example,203.0.113.5,9999,filtered,");
    }

    #[test]
    fn test_xml() {
        let text = plain(OutputFormat::Xml).render(&sample()).unwrap();

        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<address addr=\"203.0.113.5\" addrtype=\"ipv4\"/>"));
        assert!(text.contains("<hostname name=\"scanme.example\" type=\"user\"/>"));
        assert!(text.contains("<state state=\"open\" reason=\"syn-ack\"/>"));
        assert!(text.contains("<state state=\"closed\" reason=\"reset\"/>"));
        assert!(text.contains("<state state=\"filtered\" reason=\"no-response\"/>"));
        assert!(text.trim_end().ends_with("</nmaprun>"));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.csv");

        OutputWriter::new(OutputFormat::Csv, Some(path.clone()))
            .write(&sample())
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 4);
    }
}
