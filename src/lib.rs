//! Receipt Processor Library
//!
//! A Rust library for ingesting flat, denormalized receipt exports (one CSV row
//! per sold line item) into a normalized relational schema of sellers, venues,
//! receipts and line items.
//!
//! This library provides tools for:
//! - Decoding fixed-layout receipt CSV files row by row
//! - Parsing locale-specific dates and exact decimal amounts
//! - Decomposing each row into ordered, idempotent seller/venue/receipt/item writes
//! - Dispatching files to a bounded pool of concurrent workers
//! - PostgreSQL and in-memory persistence gateways

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod gateway;
    pub mod models;
    pub mod services {
        pub mod decomposer;
        pub mod discovery;
        pub mod dispatcher;
        pub mod field_parsers;
        pub mod record_decoder;
    }
    pub mod adapters {
        pub mod memory;
        pub mod postgres;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::gateway::{GatewayError, PersistenceGateway};
pub use app::models::{Column, EntityLayer, Item, NewItem, NewReceipt, Receipt, ReceiptRow};
pub use config::{Config, DateFallback};

/// Result type alias for the receipt processor
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for receipt ingestion operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Directory traversal error
    #[error("Directory traversal error: {message}")]
    DirectoryTraversal {
        message: String,
        #[source]
        source: walkdir::Error,
    },

    /// File has no header row
    #[error("Empty file: {file}")]
    EmptyFile { file: String },

    /// Malformed CSV record
    #[error("Decode error in file '{file}' at row {row}: {message}")]
    Decode {
        file: String,
        row: usize,
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    /// Decimal literal could not be parsed
    #[error("Decimal parsing error: '{value}' is not a valid decimal")]
    DecimalParsing {
        value: String,
        #[source]
        source: rust_decimal::Error,
    },

    /// Date/time parsing error
    #[error("Date/time parsing error: '{value}' does not match DD.MM.YYYY hh:mm")]
    DateTimeParsing {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Seller upsert failed
    #[error("Failed to process seller '{name}'")]
    SellerWrite {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Venue upsert failed
    #[error("Failed to process venue '{name}'")]
    VenueWrite {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Receipt upsert failed, or its grand total could not be parsed
    #[error("Failed to process receipt '{receipt_id}'")]
    ReceiptWrite {
        receipt_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Item insert failed, or its line total could not be parsed
    #[error("Failed to process item '{name}' of receipt '{receipt_id}'")]
    ItemWrite {
        receipt_id: String,
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A row failed; wraps the layer error with file context
    #[error("Error processing record {row} of '{file}': {source}")]
    RowFailed {
        file: String,
        row: usize,
        #[source]
        source: Box<Error>,
    },

    /// Persistence gateway error
    #[error("Store error: {0}")]
    Gateway(#[from] GatewayError),

    /// Database connection error
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// Processing interrupted
    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a directory traversal error
    pub fn directory_traversal(message: impl Into<String>, source: walkdir::Error) -> Self {
        Self::DirectoryTraversal {
            message: message.into(),
            source,
        }
    }

    /// Create an empty file error
    pub fn empty_file(file: impl Into<String>) -> Self {
        Self::EmptyFile { file: file.into() }
    }

    /// Create a decode error
    pub fn decode(
        file: impl Into<String>,
        row: usize,
        message: impl Into<String>,
        source: Option<csv::Error>,
    ) -> Self {
        Self::Decode {
            file: file.into(),
            row,
            message: message.into(),
            source,
        }
    }

    /// Create a seller write error
    pub fn seller_write(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SellerWrite {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create a venue write error
    pub fn venue_write(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::VenueWrite {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create a receipt write error
    pub fn receipt_write(
        receipt_id: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ReceiptWrite {
            receipt_id: receipt_id.into(),
            source: source.into(),
        }
    }

    /// Create an item write error
    pub fn item_write(
        receipt_id: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ItemWrite {
            receipt_id: receipt_id.into(),
            name: name.into(),
            source: source.into(),
        }
    }

    /// Attach file and row context to a row-level error
    pub fn row_failed(file: impl Into<String>, row: usize, source: Error) -> Self {
        Self::RowFailed {
            file: file.into(),
            row,
            source: Box::new(source),
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            message: message.into(),
            source,
        }
    }

    /// Create a processing interrupted error
    pub fn processing_interrupted(reason: impl Into<String>) -> Self {
        Self::ProcessingInterrupted {
            reason: reason.into(),
        }
    }

    /// Relational layer that failed, if this is a write error
    pub fn layer(&self) -> Option<EntityLayer> {
        match self {
            Self::SellerWrite { .. } => Some(EntityLayer::Seller),
            Self::VenueWrite { .. } => Some(EntityLayer::Venue),
            Self::ReceiptWrite { .. } => Some(EntityLayer::Receipt),
            Self::ItemWrite { .. } => Some(EntityLayer::Item),
            Self::RowFailed { source, .. } => source.layer(),
            _ => None,
        }
    }

    /// Whether this error must abort the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::DirectoryTraversal { .. }
                | Self::Database { .. }
                | Self::ProcessingInterrupted { .. }
        )
    }
}
