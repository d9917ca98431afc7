//! Shared fixtures for ingestion integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use receipt_processor::app::adapters::memory::MemoryGateway;
use receipt_processor::app::gateway::GatewayResult;
use receipt_processor::app::models::{ItemId, SellerId, VenueId};
use receipt_processor::{NewItem, NewReceipt, PersistenceGateway, Receipt};

pub const HEADER: &str = "Receipt ID,Seller,Venue,Date and time,Customer name,Payment method,Delivery address,Item name,Quantity,Unit price,Line total,Subtotal,Tax,Delivery fee,Tip,Grand total";

/// Build one data row for `receipt_id` with a single item
pub fn receipt_row(receipt_id: &str, seller: &str, venue: &str, item: &str) -> String {
    format!(
        "{},{},{},01.03.2024 14:30,Alice,card,\"123 Main St, Springfield\",{},2,3.50,7.00,6.00,0.60,0.00,0.40,7.00",
        receipt_id, seller, venue, item
    )
}

/// Write a CSV file with the standard header followed by `rows`
pub fn write_csv(dir: &Path, name: &str, rows: &[String]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut content = format!("{}\n", HEADER);
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(&path, content).unwrap();
    path
}

/// Memory gateway that tracks how many calls are in flight at once
///
/// Every call sleeps for `delay` so concurrent files overlap.
pub struct InstrumentedGateway {
    inner: MemoryGateway,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl InstrumentedGateway {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryGateway::new(),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &MemoryGateway {
        &self.inner
    }

    /// Highest number of simultaneous calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceGateway for InstrumentedGateway {
    async fn create_or_get_seller(&self, name: &str) -> GatewayResult<SellerId> {
        self.enter().await;
        let result = self.inner.create_or_get_seller(name).await;
        self.leave();
        result
    }

    async fn create_or_get_venue(&self, name: &str, seller_id: SellerId) -> GatewayResult<VenueId> {
        self.enter().await;
        let result = self.inner.create_or_get_venue(name, seller_id).await;
        self.leave();
        result
    }

    async fn create_or_get_receipt(&self, receipt: NewReceipt) -> GatewayResult<Receipt> {
        self.enter().await;
        let result = self.inner.create_or_get_receipt(receipt).await;
        self.leave();
        result
    }

    async fn create_item(&self, item: NewItem) -> GatewayResult<ItemId> {
        self.enter().await;
        let result = self.inner.create_item(item).await;
        self.leave();
        result
    }
}
