//! Relational decomposition of receipt rows
//!
//! One flat row becomes four dependent writes, always in the order
//! seller -> venue -> receipt -> item. Each layer needs the identities
//! resolved by the layers before it, so a failure stops the row at that
//! layer. Writes that already succeeded are kept: they are conflict-safe and
//! resolve to the same rows when the file is ingested again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::gateway::{GatewayResult, PersistenceGateway};
use crate::app::models::{
    Column, DecomposedRow, NewItem, NewReceipt, ReceiptRow, SellerId, VenueId,
};
use crate::app::services::field_parsers::{parse_decimal, parse_optional_date_time};
use crate::config::DateFallback;
use crate::{Error, Result};

/// Options controlling how rows are decomposed
#[derive(Debug, Clone, Copy, Default)]
pub struct DecomposerOptions {
    /// Handling of unparsable timestamps
    pub date_fallback: DateFallback,
    /// Memoize seller/venue identities for the decomposer's lifetime
    pub cache_lookups: bool,
}

/// Decomposes the rows of one file into ordered gateway writes
///
/// Create one decomposer per file; the optional lookup memo lives exactly as
/// long as the decomposer.
pub struct RowDecomposer {
    gateway: Arc<dyn PersistenceGateway>,
    options: DecomposerOptions,
    cancellation_token: CancellationToken,
    sellers: HashMap<String, SellerId>,
    venues: HashMap<(SellerId, String), VenueId>,
}

impl RowDecomposer {
    /// Create a decomposer writing through `gateway`
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        options: DecomposerOptions,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            options,
            cancellation_token,
            sellers: HashMap::new(),
            venues: HashMap::new(),
        }
    }

    /// Write one row and return the identities it resolved to
    pub async fn decompose(&mut self, row: &ReceiptRow) -> Result<DecomposedRow> {
        let seller_name = row.get(Column::Seller);
        let seller_id = self
            .resolve_seller(seller_name)
            .await
            .map_err(|e| at_layer(e, |e| Error::seller_write(seller_name, e)))?;

        let venue_name = row.get(Column::Venue);
        let venue_id = self
            .resolve_venue(venue_name, seller_id)
            .await
            .map_err(|e| at_layer(e, |e| Error::venue_write(venue_name, e)))?;

        let receipt_id = row.receipt_id();
        let date = parse_optional_date_time(row.get(Column::DateTime), self.options.date_fallback)
            .map_err(|e| Error::receipt_write(receipt_id, e))?;
        let total = parse_decimal(row.get(Column::GrandTotal))
            .map_err(|e| Error::receipt_write(receipt_id, e))?;

        let receipt = self
            .guarded(self.gateway.create_or_get_receipt(NewReceipt {
                id: receipt_id.to_string(),
                date,
                seller_id,
                venue_id,
                total,
            }))
            .await
            .map_err(|e| at_layer(e, |e| Error::receipt_write(receipt_id, e)))?;

        let item_name = row.get(Column::ItemName);
        let line_total = parse_decimal(row.get(Column::LineTotal))
            .map_err(|e| Error::item_write(receipt_id, item_name, e))?;

        // Items always point at the seller and venue of the stored receipt
        if (receipt.seller_id, receipt.venue_id) != (seller_id, venue_id) {
            warn!(
                "Receipt {} is stored under seller {} venue {}; row names seller {} venue {}",
                receipt.id, receipt.seller_id, receipt.venue_id, seller_id, venue_id
            );
        }

        let item_id = self
            .guarded(self.gateway.create_item(NewItem {
                receipt_id: receipt.id.clone(),
                name: item_name.to_string(),
                date,
                quantity: row.get(Column::Quantity).to_string(),
                unit_price: row.get(Column::UnitPrice).to_string(),
                line_total,
                seller_id: receipt.seller_id,
                venue_id: receipt.venue_id,
            }))
            .await
            .map_err(|e| at_layer(e, |e| Error::item_write(receipt_id, item_name, e)))?;

        debug!(
            "Row of receipt {} stored as item {} (seller {}, venue {})",
            receipt.id, item_id, receipt.seller_id, receipt.venue_id
        );

        Ok(DecomposedRow {
            seller_id: receipt.seller_id,
            venue_id: receipt.venue_id,
            receipt_id: receipt.id,
            item_id,
        })
    }

    async fn resolve_seller(&mut self, name: &str) -> Result<SellerId> {
        if let Some(&id) = self.sellers.get(name) {
            return Ok(id);
        }

        let id = self
            .guarded(self.gateway.create_or_get_seller(name))
            .await?;
        if self.options.cache_lookups {
            self.sellers.insert(name.to_string(), id);
        }
        Ok(id)
    }

    async fn resolve_venue(&mut self, name: &str, seller_id: SellerId) -> Result<VenueId> {
        let key = (seller_id, name.to_string());
        if let Some(&id) = self.venues.get(&key) {
            return Ok(id);
        }

        let id = self
            .guarded(self.gateway.create_or_get_venue(name, seller_id))
            .await?;
        if self.options.cache_lookups {
            self.venues.insert(key, id);
        }
        Ok(id)
    }

    /// Run a gateway call unless the run is cancelled first
    async fn guarded<T>(&self, call: impl Future<Output = GatewayResult<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => {
                Err(Error::processing_interrupted("cancelled during store write"))
            }
            result = call => result.map_err(Error::from),
        }
    }
}

/// Classify a step failure at its layer, keeping interruptions distinct
fn at_layer(error: Error, classify: impl FnOnce(Error) -> Error) -> Error {
    match error {
        Error::ProcessingInterrupted { .. } => error,
        other => classify(other),
    }
}
