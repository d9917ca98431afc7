//! Persistence gateway boundary
//!
//! The ingestion core needs exactly four operations from the store. Each one
//! is keyed by natural identity and must be safe to repeat: seller, venue and
//! receipt writes resolve to the existing row on conflict, item writes always
//! insert. Implementations are shared by every file worker and must tolerate
//! concurrent calls.

use async_trait::async_trait;

use crate::app::models::{ItemId, NewItem, NewReceipt, Receipt, SellerId, VenueId};

/// Result type for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors raised by a persistence gateway
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// Query execution failed
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused or could not serve the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Idempotent write operations against the normalized receipt schema
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert a seller or return the id of the existing one with this name
    async fn create_or_get_seller(&self, name: &str) -> GatewayResult<SellerId>;

    /// Insert a venue under a seller or return the existing one's id
    async fn create_or_get_venue(&self, name: &str, seller_id: SellerId) -> GatewayResult<VenueId>;

    /// Insert a receipt or return the stored one with the same external id
    async fn create_or_get_receipt(&self, receipt: NewReceipt) -> GatewayResult<Receipt>;

    /// Insert a line item; no duplicate detection
    async fn create_item(&self, item: NewItem) -> GatewayResult<ItemId>;
}
