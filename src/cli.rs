use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "synscan")]
#[command(version)]
#[command(about = "Half-open (SYN) TCP port scanner", long_about = None)]
pub struct Cli {
    #[arg(help = "Target IPv4 address or hostname")]
    pub target: String,

    #[arg(short, long, default_value = "common", help = "Ports to scan (e.g., 80, 1-1024, 22,80,443, common, web, top20)")]
    pub ports: String,

    #[arg(long, help = "Per-attempt response timeout in milliseconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Extra attempts for a port that stays silent")]
    pub retries: Option<u32>,

    #[arg(short, long, help = "Maximum number of ports probed at once")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Overall scan deadline in milliseconds")]
    pub deadline: Option<u64>,

    #[arg(short = 'o', long, value_enum, help = "Output format")]
    pub output_format: Option<OutputFormat>,

    #[arg(short = 'f', long, help = "Output file path")]
    pub output_file: Option<PathBuf>,

    #[arg(long, help = "Configuration file (defaults to the user config directory)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Show a progress bar")]
    pub progress: bool,

    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(short, long, action = ArgAction::Count, help = "Verbose output (-vv for debug logs)")]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[value(name = "human", help = "Human-readable output")]
    Human,
    #[value(name = "json", help = "JSON output")]
    Json,
    #[value(name = "csv", help = "CSV output")]
    Csv,
    #[value(name = "xml", help = "XML output (Nmap compatible)")]
    Xml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}
