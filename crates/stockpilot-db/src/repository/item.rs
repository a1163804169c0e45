//! # Stock Item Repository
//!
//! Database operations for stock items.
//!
//! ## Key Operations
//! - Lookup by ID and by SKU (reconciliation resolves SKUs here)
//! - Placeholder creation for unknown SKUs during sync
//! - Low-stock report
//! - Soft-deactivation (items are never hard-deleted: historical ledger
//!   entries reference them forever)
//!
//! Quantity columns are **not** writable here. The adjustment engine owns
//! the only UPDATE that touches `current_quantity`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockpilot_core::{validation, ItemOrigin, StockItem, DEFAULT_LOW_STOCK_THRESHOLD};

const ITEM_COLUMNS: &str = "id, sku, name, track_inventory, allow_backorder, current_quantity, \
     low_stock_threshold, price_cents, origin, is_active, created_at, updated_at";

/// Repository for stock item database operations.
#[derive(Debug, Clone)]
pub struct StockItemRepository {
    pool: SqlitePool,
}

impl StockItemRepository {
    /// Creates a new StockItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockItemRepository { pool }
    }

    /// Gets an item by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StockItem>> {
        let item = sqlx::query_as::<_, StockItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM stock_items WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Gets an active item by its SKU.
    ///
    /// Deactivated items are invisible to SKU resolution so a sync never
    /// resurrects a retired item by accident.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<StockItem>> {
        let item = sqlx::query_as::<_, StockItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM stock_items WHERE sku = ?1 AND is_active = 1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Inserts a new item.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, item: &StockItem) -> DbResult<()> {
        debug!(sku = %item.sku, "Inserting stock item");

        sqlx::query(
            r#"
            INSERT INTO stock_items (
                id, sku, name, track_inventory, allow_backorder,
                current_quantity, low_stock_threshold, price_cents,
                origin, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.track_inventory)
        .bind(item.allow_backorder)
        .bind(item.current_quantity)
        .bind(item.low_stock_threshold)
        .bind(item.price_cents)
        .bind(item.origin)
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Creates a minimal placeholder item for a SKU reported by an external
    /// source but unknown to us. Placeholders are marked `origin = sync` so
    /// later syncs may refresh their metadata; manually curated items are
    /// never touched that way.
    pub async fn create_placeholder(
        &self,
        sku: &str,
        name: Option<&str>,
        price_cents: Option<i64>,
    ) -> DbResult<StockItem> {
        validation::validate_sku(sku)
            .map_err(|e| DbError::QueryFailed(e.to_string()))?;

        let now = Utc::now();
        let item = StockItem {
            id: Uuid::new_v4().to_string(),
            sku: sku.trim().to_string(),
            name: name.unwrap_or(sku).to_string(),
            track_inventory: true,
            allow_backorder: false,
            current_quantity: 0,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            price_cents,
            origin: ItemOrigin::Sync,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %item.sku, "Creating placeholder item for unknown SKU");
        self.insert(&item).await?;
        Ok(item)
    }

    /// Updates non-quantity metadata on a *sync-created* item.
    ///
    /// No-op for manually curated items: the conflict policy says external
    /// metadata never clobbers curated values.
    pub async fn refresh_sync_metadata(
        &self,
        id: &str,
        name: Option<&str>,
        price_cents: Option<i64>,
    ) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE stock_items SET
                name = COALESCE(?2, name),
                price_cents = COALESCE(?3, price_cents),
                updated_at = ?4
            WHERE id = ?1 AND origin = 'sync'
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(price_cents)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates the low-stock threshold.
    pub async fn set_threshold(&self, id: &str, threshold: i64) -> DbResult<()> {
        validation::validate_threshold(threshold)
            .map_err(|e| DbError::QueryFailed(e.to_string()))?;

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE stock_items SET low_stock_threshold = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(threshold)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StockItem", id));
        }
        Ok(())
    }

    /// Soft-deactivates an item.
    ///
    /// ## Why Soft Delete?
    /// - Ledger entries still reference this item
    /// - Can be restored if deactivated by mistake
    pub async fn soft_deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deactivating stock item");

        let now = Utc::now();
        let result =
            sqlx::query("UPDATE stock_items SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StockItem", id));
        }
        Ok(())
    }

    /// Low-stock report: active, tracked items at or below their threshold,
    /// most depleted first.
    pub async fn low_stock_report(&self, limit: u32) -> DbResult<Vec<StockItem>> {
        let items = sqlx::query_as::<_, StockItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM stock_items
            WHERE is_active = 1
              AND track_inventory = 1
              AND current_quantity <= low_stock_threshold
            ORDER BY current_quantity - low_stock_threshold ASC, sku
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Counts active items (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_items WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new item ID.
pub fn generate_item_id() -> String {
    Uuid::new_v4().to_string()
}
