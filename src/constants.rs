//! Application constants for the receipt processor
//!
//! This module contains the input column layout, parsing patterns and default
//! values used throughout the receipt processor application.

// =============================================================================
// Input Layout
// =============================================================================

/// Number of fields in every receipt export row
pub const FIELD_COUNT: usize = 16;

/// File extension of candidate input files (matched case-insensitively)
pub const CSV_EXTENSION: &str = ".csv";

/// Receipt timestamp pattern: `DD.MM.YYYY hh:mm`, 24-hour, no timezone
pub const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

// =============================================================================
// Environment
// =============================================================================

/// Environment variable consulted when `--postgres-url` is not given
pub const POSTGRES_URL_ENV: &str = "PG_URL";

// =============================================================================
// Processing Defaults
// =============================================================================

/// Files admitted concurrently unless overridden; 1 serializes file processing
pub const DEFAULT_POOL_SIZE: usize = 1;

/// Upper bound accepted for the admission pool
pub const MAX_POOL_SIZE: usize = 256;

/// Capacity of the discovery -> dispatcher work channel
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Seconds to wait for a pooled database connection
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Progress spinner refresh interval in milliseconds
pub const PROGRESS_TICK_MS: u64 = 120;
