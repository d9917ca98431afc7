//! In-memory persistence gateway
//!
//! Mirrors the conflict semantics of the PostgreSQL adapter over
//! mutex-guarded maps. Used by `--dry-run` to preview what a run would create
//! and by tests as a store double.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::app::gateway::{GatewayError, GatewayResult, PersistenceGateway};
use crate::app::models::{
    Item, ItemId, NewItem, NewReceipt, Receipt, Seller, SellerId, Venue, VenueId,
};

/// Number of stored rows per entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub sellers: usize,
    pub venues: usize,
    pub receipts: usize,
    pub items: usize,
}

#[derive(Debug, Default)]
struct Tables {
    sellers: Vec<Seller>,
    seller_ids: HashMap<String, SellerId>,
    venues: Vec<Venue>,
    venue_ids: HashMap<(SellerId, String), VenueId>,
    receipts: Vec<Receipt>,
    receipt_index: HashMap<String, usize>,
    items: Vec<Item>,
}

/// Gateway storing everything in process memory
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tables: Mutex<Tables>,
}

impl MemoryGateway {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> GatewayResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| GatewayError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    /// Row counts per entity
    pub fn counts(&self) -> EntityCounts {
        self.lock()
            .map(|tables| EntityCounts {
                sellers: tables.sellers.len(),
                venues: tables.venues.len(),
                receipts: tables.receipts.len(),
                items: tables.items.len(),
            })
            .unwrap_or_default()
    }

    /// Stored sellers in creation order
    pub fn sellers(&self) -> Vec<Seller> {
        self.lock().map(|t| t.sellers.clone()).unwrap_or_default()
    }

    /// Stored venues in creation order
    pub fn venues(&self) -> Vec<Venue> {
        self.lock().map(|t| t.venues.clone()).unwrap_or_default()
    }

    /// Stored receipts in creation order
    pub fn receipts(&self) -> Vec<Receipt> {
        self.lock().map(|t| t.receipts.clone()).unwrap_or_default()
    }

    /// Stored items in creation order
    pub fn items(&self) -> Vec<Item> {
        self.lock().map(|t| t.items.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_or_get_seller(&self, name: &str) -> GatewayResult<SellerId> {
        let mut tables = self.lock()?;
        if let Some(&id) = tables.seller_ids.get(name) {
            return Ok(id);
        }

        let id = tables.sellers.len() as SellerId + 1;
        tables.sellers.push(Seller {
            id,
            name: name.to_string(),
        });
        tables.seller_ids.insert(name.to_string(), id);
        Ok(id)
    }

    async fn create_or_get_venue(&self, name: &str, seller_id: SellerId) -> GatewayResult<VenueId> {
        let mut tables = self.lock()?;
        let key = (seller_id, name.to_string());
        if let Some(&id) = tables.venue_ids.get(&key) {
            return Ok(id);
        }

        let id = tables.venues.len() as VenueId + 1;
        tables.venues.push(Venue {
            id,
            name: name.to_string(),
            seller_id,
        });
        tables.venue_ids.insert(key, id);
        Ok(id)
    }

    async fn create_or_get_receipt(&self, receipt: NewReceipt) -> GatewayResult<Receipt> {
        let mut tables = self.lock()?;
        if let Some(&index) = tables.receipt_index.get(&receipt.id) {
            return Ok(tables.receipts[index].clone());
        }

        let index = tables.receipts.len();
        tables.receipt_index.insert(receipt.id.clone(), index);
        let stored = Receipt::from(receipt);
        tables.receipts.push(stored.clone());
        Ok(stored)
    }

    async fn create_item(&self, item: NewItem) -> GatewayResult<ItemId> {
        let mut tables = self.lock()?;
        let id = tables.items.len() as ItemId + 1;
        tables.items.push(Item::from_new(id, item));
        Ok(id)
    }
}
