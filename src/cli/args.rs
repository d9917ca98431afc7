//! Command-line argument definitions for the receipt processor
//!
//! This module defines the CLI interface using the clap derive API. The
//! connection string may come from `--postgres-url` or the `PG_URL`
//! environment variable.

use crate::config::{Config, DateFallback};
use crate::constants::DEFAULT_POOL_SIZE;
use crate::{Error, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the receipt processor
///
/// Walks a directory of receipt CSV exports and writes every row into a
/// normalized PostgreSQL schema of sellers, venues, receipts and items.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "receipt-processor",
    version,
    about = "Ingest receipt CSV exports into a normalized PostgreSQL schema",
    long_about = "Walks an input directory recursively and ingests every .csv receipt export. \
                  Each row is decomposed into an idempotent seller, venue and receipt upsert \
                  followed by a line item insert. Files are processed by a bounded pool of \
                  workers; a failing file is reported and does not stop the others."
)]
pub struct Args {
    /// Directory containing receipt CSV exports
    ///
    /// Walked recursively. Every regular file whose name ends in .csv
    /// (case-insensitive) is ingested.
    #[arg(
        short = 'i',
        long = "input-dir",
        value_name = "PATH",
        help = "Directory containing receipt CSV exports"
    )]
    pub input_dir: PathBuf,

    /// PostgreSQL connection string
    ///
    /// Falls back to the PG_URL environment variable when not given.
    #[arg(
        long = "postgres-url",
        value_name = "URL",
        help = "PostgreSQL connection string (defaults to $PG_URL)"
    )]
    pub postgres_url: Option<String>,

    /// Number of files processed concurrently
    ///
    /// The default of 1 processes files strictly one after another, which
    /// avoids lock contention between files that share sellers or receipts.
    #[arg(
        short = 'j',
        long = "workers",
        value_name = "COUNT",
        default_value_t = DEFAULT_POOL_SIZE,
        help = "Number of files processed concurrently"
    )]
    pub workers: usize,

    /// Maximum pooled database connections
    ///
    /// Defaults to the number of CPUs or the worker count, whichever is larger.
    #[arg(
        long = "max-connections",
        value_name = "COUNT",
        help = "Maximum pooled database connections"
    )]
    pub max_connections: Option<u32>,

    /// Fail rows whose timestamp does not match DD.MM.YYYY hh:mm
    ///
    /// By default such rows are kept and stored without a timestamp.
    #[arg(
        long = "reject-invalid-dates",
        help = "Fail rows with an unparsable timestamp instead of storing it as empty"
    )]
    pub reject_invalid_dates: bool,

    /// Remember resolved seller and venue ids while processing one file
    ///
    /// Skips repeated upserts for rows of the same file that share a seller or
    /// venue. Nothing is remembered across files.
    #[arg(
        long = "cache-lookups",
        help = "Reuse seller and venue ids within a file"
    )]
    pub cache_lookups: bool,

    /// Ingest into an in-memory store instead of PostgreSQL
    ///
    /// Decodes and decomposes every file without a database. Useful for
    /// validating exports before a real run.
    #[arg(
        long = "dry-run",
        help = "Ingest into an in-memory store without touching the database"
    )]
    pub dry_run: bool,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output (quiet mode)
    ///
    /// Only show errors. Overrides verbose settings.
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Output format for the run summary
    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format for the run summary"
    )]
    pub output_format: OutputFormat,
}

/// Output format options for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON format for scripting
    Json,
}

impl Args {
    /// Validate the arguments for consistency
    pub fn validate(&self) -> Result<()> {
        if !self.input_dir.exists() {
            return Err(Error::configuration(format!(
                "Input directory does not exist: {}",
                self.input_dir.display()
            )));
        }

        if !self.input_dir.is_dir() {
            return Err(Error::configuration(format!(
                "Input path is not a directory: {}",
                self.input_dir.display()
            )));
        }

        if self.workers == 0 {
            return Err(Error::configuration(
                "Number of workers must be greater than 0",
            ));
        }

        if self.max_connections == Some(0) {
            return Err(Error::configuration(
                "Maximum database connections must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Check if we should show the progress spinner
    pub fn show_progress(&self) -> bool {
        !self.quiet && self.output_format == OutputFormat::Human
    }

    /// Build the run configuration, consulting the environment for the URL
    pub fn to_config(&self) -> Config {
        let date_fallback = if self.reject_invalid_dates {
            DateFallback::Reject
        } else {
            DateFallback::ZeroValue
        };
        let max_connections = self
            .max_connections
            .unwrap_or_else(|| (num_cpus::get() as u32).max(self.workers as u32));

        let mut config = Config::new(self.input_dir.clone())
            .with_pool_size(self.workers)
            .with_max_connections(max_connections)
            .with_date_fallback(date_fallback);

        if let Some(url) = &self.postgres_url {
            config = config.with_database_url(url.clone());
        }
        if self.cache_lookups {
            config = config.with_cache_lookups();
        }
        if self.dry_run {
            config = config.with_dry_run();
        }
        if self.show_progress() {
            config = config.with_progress();
        }

        config.with_env_fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(extra: &[&str], dir: &std::path::Path) -> Args {
        let dir = dir.to_string_lossy().to_string();
        let mut argv = vec!["receipt-processor", "--input-dir", dir.as_str()];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let args = parse(&[], temp_dir.path());

        assert_eq!(args.workers, DEFAULT_POOL_SIZE);
        assert_eq!(args.postgres_url, None);
        assert!(!args.reject_invalid_dates);
        assert!(!args.cache_lookups);
        assert!(!args.dry_run);
        assert_eq!(args.output_format, OutputFormat::Human);
        assert_eq!(args.get_log_level(), "warn");
        assert!(args.show_progress());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_input_dir_is_required() {
        let result = Args::try_parse_from(["receipt-processor"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_levels() {
        let temp_dir = TempDir::new().unwrap();

        assert_eq!(parse(&["-v"], temp_dir.path()).get_log_level(), "info");
        assert_eq!(parse(&["-vv"], temp_dir.path()).get_log_level(), "debug");
        assert_eq!(parse(&["-vvv"], temp_dir.path()).get_log_level(), "trace");

        let quiet = parse(&["-q"], temp_dir.path());
        assert_eq!(quiet.get_log_level(), "error");
        assert!(!quiet.show_progress());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_string_lossy().to_string();
        let result = Args::try_parse_from(["receipt-processor", "-i", dir.as_str(), "-q", "-v"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let args = parse(&[], &temp_dir.path().join("missing"));

        match args.validate().unwrap_err() {
            Error::Configuration { message } => assert!(message.contains("does not exist")),
            _ => panic!("Expected Configuration error"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let temp_dir = TempDir::new().unwrap();
        let args = parse(&["-j", "0"], temp_dir.path());
        assert!(matches!(
            args.validate(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_to_config() {
        let temp_dir = TempDir::new().unwrap();
        let args = parse(
            &[
                "--postgres-url",
                "postgres://localhost/receipts",
                "-j",
                "4",
                "--max-connections",
                "8",
                "--reject-invalid-dates",
                "--cache-lookups",
                "--output-format",
                "json",
            ],
            temp_dir.path(),
        );

        let config = args.to_config();
        assert_eq!(config.input_dir, temp_dir.path());
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.date_fallback, DateFallback::Reject);
        assert!(config.cache_lookups);
        assert!(!config.dry_run);
        assert!(!config.show_progress);
        assert_eq!(config.database_url(), Some("postgres://localhost/receipts"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_connections_covers_workers() {
        let temp_dir = TempDir::new().unwrap();
        let args = parse(&["-j", "200", "--dry-run"], temp_dir.path());

        let config = args.to_config();
        assert!(config.database.max_connections >= 200);
        assert!(config.dry_run);
    }
}
