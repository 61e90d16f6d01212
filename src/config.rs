use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{Cli, OutputFormat};
use crate::scanner::ScanOptions;

/// Central configuration for synscan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scanning: ScanConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub per_attempt_timeout_ms: u64,
    pub retry_count: u32,
    pub max_concurrency: usize,
    pub overall_deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: String,
    pub color_enabled: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout_ms: 1000,
            retry_count: 1,
            max_concurrency: 16,
            overall_deadline_ms: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "human".to_string(),
            color_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from the standard config directory.
    ///
    /// A missing file yields the defaults; nothing is written.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("synscan");
        path.push("config.json");
        path
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.scanning.per_attempt_timeout_ms == 0 {
            return Err(anyhow::anyhow!("per_attempt_timeout_ms must be greater than 0"));
        }

        if self.scanning.max_concurrency == 0 {
            return Err(anyhow::anyhow!("max_concurrency must be greater than 0"));
        }

        if self.scanning.overall_deadline_ms == Some(0) {
            return Err(anyhow::anyhow!("overall_deadline_ms must be greater than 0 when set"));
        }

        self.output_format()?;
        Ok(())
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        self.output
            .default_format
            .parse()
            .map_err(|_| anyhow::anyhow!("default_format must be one of: human, json, csv, xml"))
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            per_attempt_timeout: Duration::from_millis(self.scanning.per_attempt_timeout_ms),
            retry_count: self.scanning.retry_count,
            max_concurrency: self.scanning.max_concurrency,
            overall_deadline: self.scanning.overall_deadline_ms.map(Duration::from_millis),
        }
    }

    /// Apply command-line flags on top of file values.
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(timeout) = cli.timeout {
            self.scanning.per_attempt_timeout_ms = timeout;
        }
        if let Some(retries) = cli.retries {
            self.scanning.retry_count = retries;
        }
        if let Some(concurrency) = cli.concurrency {
            self.scanning.max_concurrency = concurrency;
        }
        if let Some(deadline) = cli.deadline {
            self.scanning.overall_deadline_ms = Some(deadline);
        }
        if let Some(format) = cli.output_format {
            if let Some(value) = clap::ValueEnum::to_possible_value(&format) {
                self.output.default_format = value.get_name().to_string();
            }
        }
        if cli.no_color {
            self.output.color_enabled = false;
        }
    }
}
