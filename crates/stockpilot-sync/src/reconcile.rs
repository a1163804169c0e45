//! # Reconciler
//!
//! Applies one normalized external record to the ledger.
//!
//! ## Per-Record Flow
//! ```text
//! ExternalSourceRecord
//!   │
//!   ├─► validate SKU ──bad──────────────────────► Failed (tallied)
//!   │
//!   ├─► resolve SKU among active items
//!   │     ├── found ──► set_absolute(quantity)            ──► Updated
//!   │     │             └─ origin=sync? refresh name/price
//!   │     └── unknown
//!   │           ├── create_missing_items ──► placeholder
//!   │           │                            + set_absolute ──► Created
//!   │           └── otherwise ─────────────────────────────► Failed
//!   │
//!   └─► last writer wins: the external absolute quantity is applied
//!       as a signed delta with full before/after audit in the ledger.
//! ```
//!
//! Re-running the same payload is a no-op: `set_absolute` to an already
//! current quantity appends nothing.

use tracing::{debug, warn};

use crate::error::SyncResult;
use stockpilot_core::{
    validation, AdjustmentOutcome, EntryType, ExternalSourceRecord, ItemOrigin,
    Reference,
};
use stockpilot_db::{AdjustmentError, Database, DbError};

/// How one record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Unknown SKU; a placeholder item was created and filled.
    Created,
    /// Existing item reconciled (including the delta-0 no-op case).
    Updated,
    /// Record could not be applied; tallied, never aborts the run.
    Failed { sku: String, reason: String },
}

impl ApplyOutcome {
    fn failed(sku: &str, reason: impl Into<String>) -> Self {
        ApplyOutcome::Failed {
            sku: sku.to_string(),
            reason: reason.into(),
        }
    }
}

/// Applies external records through the adjustment engine.
#[derive(Debug, Clone)]
pub struct Reconciler {
    db: Database,
    create_missing: bool,
}

impl Reconciler {
    pub fn new(db: Database, create_missing: bool) -> Self {
        Reconciler { db, create_missing }
    }

    /// Applies one record. Domain-level problems (bad SKU, unknown SKU,
    /// invalid quantity) come back as [`ApplyOutcome::Failed`];
    /// infrastructure failures propagate as errors.
    pub async fn apply_record(
        &self,
        record: &ExternalSourceRecord,
        reference: &Reference,
    ) -> SyncResult<ApplyOutcome> {
        if let Err(e) = validation::validate_sku(&record.external_sku) {
            return Ok(ApplyOutcome::failed(&record.external_sku, e.to_string()));
        }
        let sku = record.external_sku.trim();

        match self.db.items().get_by_sku(sku).await? {
            Some(item) => self.apply_to_existing(record, &item.id, item.origin, reference).await,
            None if self.create_missing => self.create_and_fill(record, reference).await,
            None => {
                warn!(sku = %sku, source_id = %record.source_id, "Unknown SKU; tallied as failed");
                Ok(ApplyOutcome::failed(sku, "unknown SKU"))
            }
        }
    }

    /// Existing item: drive quantity to the reported absolute value,
    /// then refresh metadata when (and only when) the item was itself
    /// created by a sync. Curated items keep their curated name/price.
    async fn apply_to_existing(
        &self,
        record: &ExternalSourceRecord,
        item_id: &str,
        origin: ItemOrigin,
        reference: &Reference,
    ) -> SyncResult<ApplyOutcome> {
        let outcome = self
            .db
            .adjustments()
            .set_absolute(item_id, record.quantity, EntryType::Sync, reference)
            .await;

        match outcome {
            Ok(AdjustmentOutcome::Skipped) => {
                debug!(item_id = %item_id, "Item does not track inventory; quantity untouched");
            }
            Ok(AdjustmentOutcome::Applied { before, after }) if before != after => {
                debug!(item_id = %item_id, before, after, "Quantity reconciled");
            }
            Ok(_) => {}
            Err(AdjustmentError::Domain(e)) => {
                return Ok(ApplyOutcome::failed(&record.external_sku, e.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        if origin == ItemOrigin::Sync {
            self.db
                .items()
                .refresh_sync_metadata(item_id, record.name.as_deref(), record.price_cents)
                .await?;
        }

        Ok(ApplyOutcome::Updated)
    }

    /// Unknown SKU with creation enabled: insert a placeholder and fill
    /// it with an initial restock entry.
    async fn create_and_fill(
        &self,
        record: &ExternalSourceRecord,
        reference: &Reference,
    ) -> SyncResult<ApplyOutcome> {
        let sku = record.external_sku.trim();

        let item = match self
            .db
            .items()
            .create_placeholder(sku, record.name.as_deref(), record.price_cents)
            .await
        {
            Ok(item) => item,
            // Two workers met the same unknown SKU; the loser falls
            // through to the existing-item path.
            Err(DbError::UniqueViolation { .. }) => {
                return match self.db.items().get_by_sku(sku).await? {
                    Some(item) => {
                        self.apply_to_existing(record, &item.id, item.origin, reference)
                            .await
                    }
                    None => Ok(ApplyOutcome::failed(sku, "unknown SKU")),
                };
            }
            Err(e) => return Err(e.into()),
        };

        match self
            .db
            .adjustments()
            .set_absolute(&item.id, record.quantity, EntryType::Restock, reference)
            .await
        {
            Ok(_) => Ok(ApplyOutcome::Created),
            Err(AdjustmentError::Domain(e)) => Ok(ApplyOutcome::failed(sku, e.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockpilot_core::StockItem;
    use stockpilot_db::DbConfig;
    use uuid::Uuid;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn record(sku: &str, quantity: i64) -> ExternalSourceRecord {
        ExternalSourceRecord {
            external_sku: sku.to_string(),
            quantity,
            price_cents: Some(199),
            name: Some(format!("External {sku}")),
            source_id: "pos-main".to_string(),
            fetched_at: Utc::now(),
        }
    }

    async fn seed_manual(db: &Database, sku: &str, qty: i64) -> String {
        let now = Utc::now();
        let item = StockItem {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: "Curated Name".to_string(),
            track_inventory: true,
            allow_backorder: false,
            current_quantity: qty,
            low_stock_threshold: 0,
            price_cents: Some(500),
            origin: ItemOrigin::Manual,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.items().insert(&item).await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn test_unknown_sku_creates_placeholder() {
        let db = test_db().await;
        let reconciler = Reconciler::new(db.clone(), true);

        let outcome = reconciler
            .apply_record(&record("NEW-SKU", 30), &Reference::new("source", "pos-main"))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);

        let item = db.items().get_by_sku("NEW-SKU").await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 30);
        assert_eq!(item.origin, ItemOrigin::Sync);
        assert_eq!(item.name, "External NEW-SKU");

        let latest = db.ledger().latest(&item.id).await.unwrap().unwrap();
        assert_eq!(latest.entry_type, EntryType::Restock);
        assert_eq!(latest.reference_id, "pos-main");
    }

    #[tokio::test]
    async fn test_unknown_sku_without_creation_fails() {
        let db = test_db().await;
        let reconciler = Reconciler::new(db.clone(), false);

        let outcome = reconciler
            .apply_record(&record("GHOST", 5), &Reference::new("source", "pos-main"))
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
        assert!(db.items().get_by_sku("GHOST").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_item_is_driven_to_reported_quantity() {
        let db = test_db().await;
        let id = seed_manual(&db, "SKU-X", 10).await;
        let reconciler = Reconciler::new(db.clone(), true);

        let outcome = reconciler
            .apply_record(&record("SKU-X", 42), &Reference::new("source", "pos-main"))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 42);
        let latest = db.ledger().latest(&id).await.unwrap().unwrap();
        assert_eq!(latest.entry_type, EntryType::Sync);
        assert_eq!(latest.delta_quantity, 32);
    }

    #[tokio::test]
    async fn test_manual_metadata_is_never_clobbered() {
        let db = test_db().await;
        let id = seed_manual(&db, "SKU-Y", 10).await;
        let reconciler = Reconciler::new(db.clone(), true);

        reconciler
            .apply_record(&record("SKU-Y", 10), &Reference::new("source", "pos-main"))
            .await
            .unwrap();

        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item.name, "Curated Name");
        assert_eq!(item.price_cents, Some(500));
    }

    #[tokio::test]
    async fn test_sync_created_metadata_is_refreshed() {
        let db = test_db().await;
        let reconciler = Reconciler::new(db.clone(), true);
        let reference = Reference::new("source", "pos-main");

        reconciler
            .apply_record(&record("SKU-Z", 5), &reference)
            .await
            .unwrap();

        let mut updated = record("SKU-Z", 7);
        updated.name = Some("Renamed Upstream".to_string());
        updated.price_cents = Some(249);
        let outcome = reconciler.apply_record(&updated, &reference).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let item = db.items().get_by_sku("SKU-Z").await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 7);
        assert_eq!(item.name, "Renamed Upstream");
        assert_eq!(item.price_cents, Some(249));
    }

    #[tokio::test]
    async fn test_reapplying_same_record_appends_nothing() {
        let db = test_db().await;
        let id = seed_manual(&db, "SKU-W", 10).await;
        let reconciler = Reconciler::new(db.clone(), true);
        let reference = Reference::new("source", "pos-main");

        reconciler
            .apply_record(&record("SKU-W", 25), &reference)
            .await
            .unwrap();
        assert_eq!(db.ledger().count_for_item(&id).await.unwrap(), 1);

        let outcome = reconciler
            .apply_record(&record("SKU-W", 25), &reference)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);
        assert_eq!(db.ledger().count_for_item(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_sku_is_failed_outcome() {
        let db = test_db().await;
        let reconciler = Reconciler::new(db, true);

        let outcome = reconciler
            .apply_record(&record("bad sku!", 5), &Reference::new("source", "pos-main"))
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_negative_reported_quantity_is_failed_outcome() {
        let db = test_db().await;
        seed_manual(&db, "SKU-N", 10).await;
        let reconciler = Reconciler::new(db.clone(), true);

        let outcome = reconciler
            .apply_record(&record("SKU-N", -4), &Reference::new("source", "pos-main"))
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));

        let item = db.items().get_by_sku("SKU-N").await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 10);
    }
}
