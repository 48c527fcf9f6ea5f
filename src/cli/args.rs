//! Command-line argument parsing for CMS Fetcher
//!
//! This module defines the CLI structure using clap derive macros: ingestion,
//! catalog inspection, offline extraction, object storage transfers,
//! authentication and configuration management.

use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use crate::app::models::TimeWindow;
use crate::errors::ConfigError;

/// CMS Fetcher - Retrieve wind turbine vibration captures
#[derive(Parser, Debug)]
#[command(
    name = "cms_fetcher",
    version,
    about = "Retrieve and parse wind turbine vibration captures from a condition-monitoring service",
    long_about = "Retrieves raw vibration captures for a time window, parses them into timestamped
records and stores them as Parquet. Honours the service's throttling (429 Retry-After) and
unavailability (503/504) signals."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve, parse and store vibration records for a time window
    Ingest(IngestArgs),

    /// List the device catalog grouped by cleaned name
    Devices,

    /// List raw files of one device without downloading them
    Files(FilesArgs),

    /// Parse an archived raw tree without network access
    Extract(ExtractArgs),

    /// Transfer artifacts to and from object storage
    Bucket(BucketArgs),

    /// Manage authentication credentials
    Auth(AuthArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Time window flags shared by `ingest` and `files`
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Window start: YYYY-MM-DD (UTC midnight) or RFC 3339 [default: 24h before --to]
    #[arg(long, value_parser = parse_date)]
    pub from: Option<DateTime<Utc>>,

    /// Window end: YYYY-MM-DD (UTC midnight) or RFC 3339 [default: now]
    #[arg(long, value_parser = parse_date)]
    pub to: Option<DateTime<Utc>>,
}

impl WindowArgs {
    /// Resolve the inclusive window, defaulting to the day ending now
    pub fn window(&self) -> Result<TimeWindow, ConfigError> {
        let end = self.to.unwrap_or_else(Utc::now);
        let start = self.from.unwrap_or(end - Duration::days(1));
        TimeWindow::new(start, end)
    }
}

/// Arguments for the ingest command
#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    /// Restrict to these device ids (repeatable; overrides the config allow-list)
    #[arg(short, long = "device", value_name = "ID")]
    pub devices: Vec<String>,

    /// Combined Parquet output path
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Directory for per-turbine Parquet files
    #[arg(long, value_name = "DIR")]
    pub processed_dir: Option<PathBuf>,

    /// Archive fetched raw files below this directory
    #[arg(long, value_name = "DIR")]
    pub raw_dir: Option<PathBuf>,

    /// Files fetched and parsed concurrently (1 = sequential)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Upload the combined file to the configured bucket
    #[arg(long)]
    pub upload: bool,

    /// Object key for --upload
    #[arg(long, value_name = "KEY", requires = "upload")]
    pub key: Option<String>,
}

/// Arguments for the files command
#[derive(Args, Debug, Clone)]
pub struct FilesArgs {
    /// Device id
    #[arg(short, long, value_name = "ID")]
    pub device: String,

    #[command(flatten)]
    pub window: WindowArgs,
}

/// Arguments for the extract command
#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Raw tree laid out as {turbine}/{component}/{file}
    #[arg(long, value_name = "DIR")]
    pub raw_dir: PathBuf,

    /// Combined Parquet output path
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Directory for per-turbine Parquet files
    #[arg(long, value_name = "DIR")]
    pub processed_dir: Option<PathBuf>,
}

/// Arguments for object storage transfers
#[derive(Args, Debug)]
pub struct BucketArgs {
    #[command(subcommand)]
    pub action: BucketAction,
}

/// Object storage actions
#[derive(Subcommand, Debug)]
pub enum BucketAction {
    /// Upload a local file
    Upload {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Object key [default: storage.key from the configuration]
        #[arg(long, value_name = "KEY")]
        key: Option<String>,
    },

    /// Download an object to a local file
    Download {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

/// Arguments for authentication management
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub action: AuthAction,
}

/// Authentication actions
#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Set up CMS authentication credentials
    Setup,

    /// Verify current credentials
    Verify,

    /// Show authentication status
    Status,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Target path [default: user config directory]
        #[arg(long, value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level implied by the flags, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

/// Parse `YYYY-MM-DD` as UTC midnight, or a full RFC 3339 timestamp
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| format!("Invalid date '{}'", value));
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("Invalid date '{}': expected YYYY-MM-DD or RFC 3339", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2024-11-29").unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 29, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("2024-11-29T06:33:13+01:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 29, 5, 33, 13).unwrap()
        );
        assert!(parse_date("29/11/2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_window_resolution() {
        let args = WindowArgs {
            from: Some(Utc.with_ymd_and_hms(2024, 11, 29, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 11, 30, 0, 0, 0).unwrap()),
        };
        let window = args.window().unwrap();
        assert_eq!(window.end_epoch() - window.start_epoch(), 86_400);

        // Only --to: the day before it
        let args = WindowArgs {
            from: None,
            ..args
        };
        assert_eq!(args.window().unwrap().start_epoch(), 1_732_838_400);
    }

    #[test]
    fn test_from_after_to_is_rejected() {
        let args = WindowArgs {
            from: Some(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 11, 30, 0, 0, 0).unwrap()),
        };
        assert!(args.window().is_err());
    }

    #[test]
    fn test_ingest_flags_parse() {
        let cli = Cli::try_parse_from([
            "cms_fetcher",
            "-v",
            "ingest",
            "--from",
            "2024-11-29",
            "--to",
            "2024-11-30",
            "--device",
            "7592",
            "-d",
            "3985",
            "--upload",
            "--key",
            "data/x.parquet",
        ])
        .unwrap();

        assert_eq!(cli.log_level(), Some(tracing::Level::INFO));
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.devices, vec!["7592", "3985"]);
                assert!(args.upload);
                assert_eq!(args.key.as_deref(), Some("data/x.parquet"));
                assert!(args.window.window().is_ok());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_key_requires_upload() {
        let result = Cli::try_parse_from(["cms_fetcher", "ingest", "--key", "k"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level() {
        let quiet = Cli::try_parse_from(["cms_fetcher", "-q", "devices"]).unwrap();
        let plain = Cli::try_parse_from(["cms_fetcher", "devices"]).unwrap();

        assert_eq!(quiet.log_level(), Some(tracing::Level::ERROR));
        assert_eq!(plain.log_level(), None);
    }
}
