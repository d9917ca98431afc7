//! Configuration management and validation.
//!
//! Provides the run configuration assembled from command-line arguments with
//! environment fallback, plus the policy knobs of the ingestion pipeline.

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY, MAX_POOL_SIZE,
    POSTGRES_URL_ENV,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// What to do with a receipt timestamp that does not match `DD.MM.YYYY hh:mm`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateFallback {
    /// Keep the row and store an absent timestamp
    #[default]
    ZeroValue,
    /// Fail the row at the receipt layer
    Reject,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    #[serde(skip_serializing)]
    pub url: Option<String>,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// Seconds to wait for a free connection
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: num_cpus::get() as u32,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

/// Global configuration for a receipt ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory walked recursively for `.csv` files
    pub input_dir: PathBuf,

    /// Files admitted concurrently
    pub pool_size: usize,

    /// Capacity of the discovery work channel
    pub queue_capacity: usize,

    /// Handling of unparsable receipt timestamps
    pub date_fallback: DateFallback,

    /// Remember resolved seller/venue ids for the lifetime of one file
    pub cache_lookups: bool,

    /// Ingest into an in-memory store instead of PostgreSQL
    pub dry_run: bool,

    /// Show a progress spinner while files are processed
    pub show_progress: bool,

    /// Database connection settings
    pub database: DatabaseConfig,
}

impl Config {
    /// Create configuration with defaults for the given input directory
    pub fn new(input_dir: PathBuf) -> Self {
        Self {
            input_dir,
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            date_fallback: DateFallback::default(),
            cache_lookups: false,
            dry_run: false,
            show_progress: false,
            database: DatabaseConfig::default(),
        }
    }

    /// Set the admission pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the database connection string
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database.url = Some(url.into());
        self
    }

    /// Set the maximum pooled connections
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.database.max_connections = max_connections;
        self
    }

    /// Set the date fallback policy
    pub fn with_date_fallback(mut self, policy: DateFallback) -> Self {
        self.date_fallback = policy;
        self
    }

    /// Enable the per-file seller/venue lookup memo
    pub fn with_cache_lookups(mut self) -> Self {
        self.cache_lookups = true;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Enable the progress spinner
    pub fn with_progress(mut self) -> Self {
        self.show_progress = true;
        self
    }

    /// Fill the connection string from the environment if it was not given
    pub fn with_env_fallback(mut self) -> Self {
        if self.database.url.as_deref().is_none_or(str::is_empty) {
            match std::env::var(POSTGRES_URL_ENV) {
                Ok(url) if !url.is_empty() => {
                    debug!("Using connection string from {}", POSTGRES_URL_ENV);
                    self.database.url = Some(url);
                }
                _ => {}
            }
        }
        self
    }

    /// Connection string, if configured
    pub fn database_url(&self) -> Option<&str> {
        self.database.url.as_deref().filter(|url| !url.is_empty())
    }

    /// Validate the configuration before any processing starts
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(Error::configuration("input directory is required"));
        }

        if self.pool_size == 0 {
            return Err(Error::configuration(
                "Number of workers must be greater than 0",
            ));
        }

        if self.pool_size > MAX_POOL_SIZE {
            return Err(Error::configuration(format!(
                "Number of workers should not exceed {} (got {})",
                MAX_POOL_SIZE, self.pool_size
            )));
        }

        if self.queue_capacity == 0 {
            return Err(Error::configuration(
                "Work queue capacity must be greater than 0",
            ));
        }

        if !self.dry_run {
            if self.database_url().is_none() {
                return Err(Error::configuration(format!(
                    "postgres-url flag or {} environment variable is required",
                    POSTGRES_URL_ENV
                )));
            }

            if self.database.max_connections == 0 {
                return Err(Error::configuration(
                    "Maximum database connections must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}
