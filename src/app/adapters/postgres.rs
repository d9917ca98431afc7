//! PostgreSQL persistence gateway
//!
//! Executes the four ingestion writes through a shared sqlx connection pool.
//! Every call checks out its own connection; no transaction spans the writes
//! of a row. The schema (`sellers`, `venues`, `receipts`, `items`) must
//! already exist.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::app::gateway::{GatewayResult, PersistenceGateway};
use crate::app::models::{ItemId, NewItem, NewReceipt, Receipt, SellerId, VenueId};
use crate::config::DatabaseConfig;
use crate::{Error, Result};

const CREATE_SELLER: &str = r#"
INSERT INTO sellers (name)
VALUES ($1)
ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
RETURNING id
"#;

// Venues carry no composite constraint, so resolve by lookup and insert only
// when the lookup comes back empty.
const CREATE_VENUE: &str = r#"
WITH existing AS (
    SELECT id FROM venues WHERE name = $1 AND seller_id = $2 LIMIT 1
), inserted AS (
    INSERT INTO venues (name, seller_id)
    SELECT $1, $2
    WHERE NOT EXISTS (SELECT 1 FROM existing)
    RETURNING id
)
SELECT id FROM existing
UNION ALL
SELECT id FROM inserted
LIMIT 1
"#;

const CREATE_RECEIPT: &str = r#"
INSERT INTO receipts (id, date, seller_id, venue_id, total)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id
RETURNING id, date, seller_id, venue_id, total
"#;

const CREATE_ITEM: &str = r#"
INSERT INTO items (receipt_id, name, date, quantity, unit_price, line_total, seller_id, venue_id)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
RETURNING id
"#;

/// Gateway backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using the database settings
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::configuration("database connection string is required"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| Error::database("unable to connect to database", e))?;

        info!(
            "Connected to PostgreSQL with up to {} pooled connections",
            config.max_connections
        );
        Ok(Self::new(pool))
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn create_or_get_seller(&self, name: &str) -> GatewayResult<SellerId> {
        let id = sqlx::query_scalar::<_, SellerId>(CREATE_SELLER)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        debug!("Seller '{}' resolved to {}", name, id);
        Ok(id)
    }

    async fn create_or_get_venue(&self, name: &str, seller_id: SellerId) -> GatewayResult<VenueId> {
        let id = sqlx::query_scalar::<_, VenueId>(CREATE_VENUE)
            .bind(name)
            .bind(seller_id)
            .fetch_one(&self.pool)
            .await?;
        debug!("Venue '{}' of seller {} resolved to {}", name, seller_id, id);
        Ok(id)
    }

    async fn create_or_get_receipt(&self, receipt: NewReceipt) -> GatewayResult<Receipt> {
        let stored = sqlx::query_as::<_, Receipt>(CREATE_RECEIPT)
            .bind(&receipt.id)
            .bind(receipt.date)
            .bind(receipt.seller_id)
            .bind(receipt.venue_id)
            .bind(receipt.total)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn create_item(&self, item: NewItem) -> GatewayResult<ItemId> {
        let id = sqlx::query_scalar::<_, ItemId>(CREATE_ITEM)
            .bind(&item.receipt_id)
            .bind(&item.name)
            .bind(item.date)
            .bind(&item.quantity)
            .bind(&item.unit_price)
            .bind(item.line_total)
            .bind(item.seller_id)
            .bind(item.venue_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }
}
