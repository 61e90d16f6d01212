use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use synscan::cli::Cli;
use synscan::config::Config;
use synscan::output::OutputWriter;
use synscan::utils::parse_ports;
use synscan::{RawTransportFactory, ScanError, Scanner, Target};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if err
                .downcast_ref::<ScanError>()
                .is_some_and(ScanError::is_privilege_error)
            {
                eprintln!("{} {}", "error:".red().bold(), err);
                eprintln!("hint: SYN scanning needs raw sockets; run as root or grant CAP_NET_RAW");
            } else {
                eprintln!("{} {:#}", "error:".red().bold(), err);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().context("failed to load configuration")?,
    };
    config.merge_cli(&cli);
    config.validate()?;

    if !config.output.color_enabled {
        colored::control::set_override(false);
    }

    let ports = parse_ports(&cli.ports)?;
    let target = Target::resolve(&cli.target)?;
    debug!(host = %target.host, ip = %target.ip, ports = ports.len(), "resolved target");

    let scanner = Scanner::new(config.scan_options()).with_progress(cli.progress);
    let result = scanner
        .scan(&RawTransportFactory::new(), &target, &ports)
        .await?;
    info!(
        open = result.count(synscan::PortVerdict::Open),
        ports = result.ports.len(),
        "scan finished"
    );

    OutputWriter::new(config.output_format()?, cli.output_file.clone())
        .with_color(config.output.color_enabled)
        .with_verbose(cli.verbose > 0)
        .write(&result)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
