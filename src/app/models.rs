//! Data models for receipt ingestion
//!
//! This module contains the decoded input row and the four normalized entities
//! it is decomposed into: sellers, venues, receipts and line items.

use crate::constants::FIELD_COUNT;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use csv::StringRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate seller identifier assigned by the store
pub type SellerId = i32;

/// Surrogate venue identifier assigned by the store
pub type VenueId = i32;

/// Surrogate item identifier assigned by the store
pub type ItemId = i32;

// =============================================================================
// Input Row
// =============================================================================

/// Column layout of a receipt export, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    ReceiptId = 0,
    Seller,
    Venue,
    DateTime,
    CustomerName,
    PaymentMethod,
    DeliveryAddress,
    ItemName,
    Quantity,
    UnitPrice,
    LineTotal,
    Subtotal,
    Tax,
    DeliveryFee,
    Tip,
    GrandTotal,
}

impl Column {
    /// Zero-based field index
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One decoded line-item row with exactly [`FIELD_COUNT`] string fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptRow {
    fields: Vec<String>,
}

impl ReceiptRow {
    /// Build a row from owned fields, rejecting any other field count
    pub fn new(fields: Vec<String>) -> Result<Self> {
        if fields.len() != FIELD_COUNT {
            return Err(Error::decode(
                "unknown",
                0,
                format!(
                    "expected {} fields, found {}",
                    FIELD_COUNT,
                    fields.len()
                ),
                None,
            ));
        }
        Ok(Self { fields })
    }

    /// Build a row from a CSV record
    pub fn from_record(record: &StringRecord) -> Result<Self> {
        Self::new(record.iter().map(str::to_string).collect())
    }

    /// Field value for a column
    pub fn get(&self, column: Column) -> &str {
        &self.fields[column.index()]
    }

    /// External receipt identifier
    pub fn receipt_id(&self) -> &str {
        self.get(Column::ReceiptId)
    }
}

impl TryFrom<Vec<&str>> for ReceiptRow {
    type Error = Error;

    fn try_from(fields: Vec<&str>) -> Result<Self> {
        Self::new(fields.into_iter().map(str::to_string).collect())
    }
}

// =============================================================================
// Normalized Entities
// =============================================================================

/// Relational layer of a write, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityLayer {
    Seller,
    Venue,
    Receipt,
    Item,
}

impl fmt::Display for EntityLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityLayer::Seller => "seller",
            EntityLayer::Venue => "venue",
            EntityLayer::Receipt => "receipt",
            EntityLayer::Item => "item",
        };
        f.write_str(name)
    }
}

/// Seller as stored, unique by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub id: SellerId,
    pub name: String,
}

/// Venue as stored, scoped to one seller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    pub seller_id: SellerId,
}

/// Receipt write payload, keyed by the external receipt id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReceipt {
    pub id: String,
    /// `None` when the source timestamp was unparsable and tolerated
    pub date: Option<NaiveDateTime>,
    pub seller_id: SellerId,
    pub venue_id: VenueId,
    pub total: Decimal,
}

/// Receipt as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Receipt {
    pub id: String,
    pub date: Option<NaiveDateTime>,
    pub seller_id: SellerId,
    pub venue_id: VenueId,
    pub total: Decimal,
}

impl From<NewReceipt> for Receipt {
    fn from(receipt: NewReceipt) -> Self {
        Self {
            id: receipt.id,
            date: receipt.date,
            seller_id: receipt.seller_id,
            venue_id: receipt.venue_id,
            total: receipt.total,
        }
    }
}

/// Line item write payload
///
/// Quantity and unit price are kept as the raw source text; only the line
/// total is parsed to an exact decimal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub receipt_id: String,
    pub name: String,
    pub date: Option<NaiveDateTime>,
    pub quantity: String,
    pub unit_price: String,
    pub line_total: Decimal,
    pub seller_id: SellerId,
    pub venue_id: VenueId,
}

/// Line item as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub receipt_id: String,
    pub name: String,
    pub date: Option<NaiveDateTime>,
    pub quantity: String,
    pub unit_price: String,
    pub line_total: Decimal,
    pub seller_id: SellerId,
    pub venue_id: VenueId,
}

impl Item {
    /// Materialize a stored item from its payload and assigned id
    pub fn from_new(id: ItemId, item: NewItem) -> Self {
        Self {
            id,
            receipt_id: item.receipt_id,
            name: item.name,
            date: item.date,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
            seller_id: item.seller_id,
            venue_id: item.venue_id,
        }
    }
}

/// Identities resolved or created for one decomposed row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecomposedRow {
    pub seller_id: SellerId,
    pub venue_id: VenueId,
    pub receipt_id: String,
    pub item_id: ItemId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> Vec<&'static str> {
        vec![
            "R1",
            "ShopA",
            "Mall1",
            "01.03.2024 14:30",
            "Alice",
            "card",
            "123 St",
            "Coffee",
            "2",
            "3.50",
            "7.00",
            "6.00",
            "0.60",
            "0.00",
            "0.40",
            "7.00",
        ]
    }

    #[test]
    fn test_column_indices_follow_file_order() {
        assert_eq!(Column::ReceiptId.index(), 0);
        assert_eq!(Column::ItemName.index(), 7);
        assert_eq!(Column::GrandTotal.index(), FIELD_COUNT - 1);
        assert_eq!(Column::UnitPrice.index(), 9);
    }

    #[test]
    fn test_row_field_access() {
        let row = ReceiptRow::try_from(sample_fields()).unwrap();

        assert_eq!(row.receipt_id(), "R1");
        assert_eq!(row.get(Column::Seller), "ShopA");
        assert_eq!(row.get(Column::Venue), "Mall1");
        assert_eq!(row.get(Column::Quantity), "2");
        assert_eq!(row.get(Column::GrandTotal), "7.00");
    }

    #[test]
    fn test_row_rejects_wrong_field_count() {
        let mut fields = sample_fields();
        fields.pop();

        let result = ReceiptRow::try_from(fields);
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    #[test]
    fn test_entity_layer_order_and_display() {
        assert!(EntityLayer::Seller < EntityLayer::Venue);
        assert!(EntityLayer::Venue < EntityLayer::Receipt);
        assert!(EntityLayer::Receipt < EntityLayer::Item);
        assert_eq!(EntityLayer::Receipt.to_string(), "receipt");
    }
}
