//! # Adjustment Engine
//!
//! The single legal mutation path for stock quantities.
//!
//! ## Atomicity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   One Adjustment = One Transaction                      │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   1. SELECT item row (quantity, flags)                                 │
//! │   2. Validate: tracked? active? enough stock / backorder?              │
//! │   3. UPDATE stock_items                                                 │
//! │         SET current_quantity = <after>                                  │
//! │       WHERE id = ? AND current_quantity = <before>   ← CAS guard       │
//! │   4. INSERT INTO stock_ledger (seq = MAX(seq)+1, before, delta, after) │
//! │  COMMIT ← Both rows or neither                                          │
//! │                                                                         │
//! │  Guard miss in step 3 = another writer committed between our read      │
//! │  and our write. Roll back, retry ONCE, then surface                    │
//! │  ConcurrencyConflict. SQLite's WAL write lock plus busy_timeout        │
//! │  keeps this path rare.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Batches
//! Multi-line operations (order fulfillment) run one adjustment per line
//! inside a single outer transaction. A failure on any line rolls back
//! every line; the caller still receives a per-line result vector so
//! operators see exactly which line failed.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AdjustResult, AdjustmentError};
use crate::repository::ledger;
use stockpilot_core::{
    validation, AdjustmentOutcome, BatchLine, BatchLineResult, CoreError, EntryType, LedgerEntry,
    Reference, StockItem,
};

/// How a single adjustment computes its delta.
#[derive(Debug, Clone, Copy)]
enum Mode {
    /// Remove `qty` units; fails with `InsufficientStock` when the item
    /// disallows backorder and `qty > current`.
    Deduct(i64),
    /// Add `qty` units; always succeeds on a tracked, active item.
    Add(i64),
    /// Drive the quantity to an absolute target; delta 0 appends nothing.
    SetAbsolute(i64),
}

/// Atomic deduct/add/set-absolute primitive enforcing stock invariants.
#[derive(Debug, Clone)]
pub struct AdjustmentEngine {
    pool: SqlitePool,
}

impl AdjustmentEngine {
    /// Creates a new AdjustmentEngine.
    pub fn new(pool: SqlitePool) -> Self {
        AdjustmentEngine { pool }
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Deducts `quantity` units from an item.
    ///
    /// ## Returns
    /// * `Applied { before, after }` - deduction committed with a ledger entry
    /// * `Skipped` - item doesn't track inventory; nothing written
    /// * `Err(InsufficientStock)` - backorder disallowed and `quantity >
    ///   current`; state unchanged
    pub async fn deduct(
        &self,
        item_id: &str,
        quantity: i64,
        entry_type: EntryType,
        reference: &Reference,
        actor: Option<&str>,
    ) -> AdjustResult<AdjustmentOutcome> {
        validation::validate_quantity(quantity).map_err(CoreError::from)?;
        self.run_with_retry(item_id, Mode::Deduct(quantity), entry_type, reference, actor, None)
            .await
    }

    /// Adds `quantity` units to an item. Always succeeds while the item
    /// exists, is active, and is tracked.
    pub async fn add(
        &self,
        item_id: &str,
        quantity: i64,
        entry_type: EntryType,
        reference: &Reference,
        actor: Option<&str>,
    ) -> AdjustResult<AdjustmentOutcome> {
        validation::validate_quantity(quantity).map_err(CoreError::from)?;
        self.run_with_retry(item_id, Mode::Add(quantity), entry_type, reference, actor, None)
            .await
    }

    /// Sets the quantity to an absolute target, computing the signed delta
    /// internally. Idempotent: re-applying the same target appends nothing
    /// and returns `Applied { before: target, after: target }`.
    ///
    /// Used by bulk import and sync reconciliation.
    pub async fn set_absolute(
        &self,
        item_id: &str,
        target: i64,
        entry_type: EntryType,
        reference: &Reference,
    ) -> AdjustResult<AdjustmentOutcome> {
        validation::validate_target_quantity(target).map_err(CoreError::from)?;
        self.run_with_retry(item_id, Mode::SetAbsolute(target), entry_type, reference, None, None)
            .await
    }

    /// Applies a batch of deduction lines in one transaction.
    ///
    /// All-or-nothing: if any line fails (domain or conflict), the whole
    /// transaction rolls back and *no* line is committed. The returned
    /// vector always has one result per input line so operators can see
    /// which line failed. A conflict-only failure is retried once.
    pub async fn apply_batch(
        &self,
        lines: &[BatchLine],
        actor: Option<&str>,
    ) -> AdjustResult<Vec<BatchLineResult>> {
        for attempt in 0..2 {
            let mut tx = self.pool.begin().await?;
            let mut results = Vec::with_capacity(lines.len());
            let mut any_failed = false;
            let mut conflict_only = true;

            for line in lines {
                if let Err(e) = validation::validate_quantity(line.quantity) {
                    results.push(BatchLineResult {
                        item_id: line.item_id.clone(),
                        result: Err(CoreError::from(e)),
                    });
                    any_failed = true;
                    conflict_only = false;
                    continue;
                }

                let outcome = apply_in(
                    &mut tx,
                    &line.item_id,
                    Mode::Deduct(line.quantity),
                    line.entry_type,
                    &line.reference,
                    actor,
                    None,
                )
                .await;

                match outcome {
                    Ok(o) => results.push(BatchLineResult {
                        item_id: line.item_id.clone(),
                        result: Ok(o),
                    }),
                    Err(AdjustmentError::Domain(e)) => {
                        if !matches!(e, CoreError::ConcurrencyConflict { .. }) {
                            conflict_only = false;
                        }
                        any_failed = true;
                        results.push(BatchLineResult {
                            item_id: line.item_id.clone(),
                            result: Err(e),
                        });
                    }
                    // Infrastructure failure: abort the whole batch.
                    Err(e) => return Err(e),
                }
            }

            if !any_failed {
                tx.commit().await?;
                return Ok(results);
            }

            // Dropping tx rolls everything back; committed nothing.
            drop(tx);

            if conflict_only && attempt == 0 {
                warn!("Batch hit a concurrency conflict; retrying once");
                continue;
            }

            debug!(
                failed = results.iter().filter(|r| r.result.is_err()).count(),
                "Batch rolled back"
            );
            return Ok(results);
        }
        unreachable!("batch retry loop always returns within two attempts")
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Runs one adjustment in its own transaction, retrying once on a
    /// compare-and-set guard miss.
    async fn run_with_retry(
        &self,
        item_id: &str,
        mode: Mode,
        entry_type: EntryType,
        reference: &Reference,
        actor: Option<&str>,
        note: Option<&str>,
    ) -> AdjustResult<AdjustmentOutcome> {
        for attempt in 0..2 {
            let mut tx = self.pool.begin().await?;
            match apply_in(&mut tx, item_id, mode, entry_type, reference, actor, note).await {
                Ok(outcome) => {
                    tx.commit().await?;
                    return Ok(outcome);
                }
                Err(e) if attempt == 0 && is_write_race(&e) => {
                    warn!(item_id = %item_id, "Adjustment lost a race; retrying once");
                    // tx dropped here = rollback
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::ConcurrencyConflict {
            item_id: item_id.to_string(),
        }
        .into())
    }
}

/// True when an error means "another writer got there first": either our
/// compare-and-set guard missed, or SQLite refused to upgrade our read
/// snapshot to a write because the database changed underneath it.
fn is_write_race(err: &AdjustmentError) -> bool {
    match err {
        AdjustmentError::Domain(CoreError::ConcurrencyConflict { .. }) => true,
        AdjustmentError::Db(db) => db.to_string().contains("database is locked"),
        _ => false,
    }
}

/// One adjustment attempt on an open transaction. No retry here; the
/// caller owns retry and commit/rollback policy.
async fn apply_in(
    conn: &mut SqliteConnection,
    item_id: &str,
    mode: Mode,
    entry_type: EntryType,
    reference: &Reference,
    actor: Option<&str>,
    note: Option<&str>,
) -> AdjustResult<AdjustmentOutcome> {
    let item = sqlx::query_as::<_, StockItem>(
        r#"
        SELECT id, sku, name, track_inventory, allow_backorder, current_quantity,
               low_stock_threshold, price_cents, origin, is_active, created_at, updated_at
        FROM stock_items WHERE id = ?1
        "#,
    )
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;

    if !item.is_active {
        return Err(CoreError::ItemDeactivated(item_id.to_string()).into());
    }

    // Quantity is authoritative only when tracking is on. An explicit
    // skip, not an error: batch callers must not fail on untracked lines.
    if !item.track_inventory {
        debug!(item_id = %item_id, "Tracking disabled; adjustment skipped");
        return Ok(AdjustmentOutcome::Skipped);
    }

    let before = item.current_quantity;
    let delta = match mode {
        Mode::Deduct(qty) => {
            if !item.can_deduct(qty) {
                return Err(CoreError::InsufficientStock {
                    sku: item.sku.clone(),
                    available: before,
                    requested: qty,
                }
                .into());
            }
            -qty
        }
        Mode::Add(qty) => qty,
        Mode::SetAbsolute(target) => target - before,
    };

    // Idempotent no-op: same target twice yields delta 0 and no entry.
    if delta == 0 {
        return Ok(AdjustmentOutcome::Applied { before, after: before });
    }

    let after = before + delta;
    let now = Utc::now();

    // CAS guard: the WHERE clause re-asserts the quantity we read above.
    // Zero rows affected means another transaction won the race.
    let updated = sqlx::query(
        r#"
        UPDATE stock_items
        SET current_quantity = ?3, updated_at = ?4
        WHERE id = ?1 AND current_quantity = ?2
        "#,
    )
    .bind(item_id)
    .bind(before)
    .bind(after)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(CoreError::ConcurrencyConflict {
            item_id: item_id.to_string(),
        }
        .into());
    }

    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        item_id: item_id.to_string(),
        seq: 0, // assigned by append_in
        delta_quantity: delta,
        quantity_before: before,
        quantity_after: after,
        entry_type,
        reference_kind: reference.kind.clone(),
        reference_id: reference.id.clone(),
        actor: actor.map(str::to_string),
        note: note.map(str::to_string),
        created_at: now,
    };
    ledger::append_in(conn, &entry).await?;

    debug!(
        item_id = %item_id,
        delta = delta,
        before = before,
        after = after,
        entry_type = %entry_type,
        "Adjustment applied"
    );

    Ok(AdjustmentOutcome::Applied { before, after })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stockpilot_core::{ItemOrigin, StockItem};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_item(db: &Database, sku: &str, qty: i64, backorder: bool, tracked: bool) -> String {
        let now = Utc::now();
        let item = StockItem {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: format!("Item {sku}"),
            track_inventory: tracked,
            allow_backorder: backorder,
            current_quantity: qty,
            low_stock_threshold: 10,
            price_cents: Some(100),
            origin: ItemOrigin::Manual,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.items().insert(&item).await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn test_deduct_and_ledger_chain() {
        let db = test_db().await;
        let id = seed_item(&db, "SKU-A", 20, false, true).await;
        let engine = db.adjustments();

        let out = engine
            .deduct(&id, 15, EntryType::Sale, &Reference::order("ORD-1"), Some("alice"))
            .await
            .unwrap();
        assert_eq!(out, AdjustmentOutcome::Applied { before: 20, after: 5 });

        // No-drift invariant: item quantity equals latest entry's after.
        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        let latest = db.ledger().latest(&id).await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 5);
        assert_eq!(latest.quantity_after, 5);
        assert_eq!(latest.quantity_before, 20);
        assert_eq!(latest.delta_quantity, -15);
        assert_eq!(latest.seq, 1);
        assert_eq!(latest.actor.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_state_unchanged() {
        let db = test_db().await;
        let id = seed_item(&db, "SKU-B", 3, false, true).await;
        let engine = db.adjustments();

        let err = engine
            .deduct(&id, 5, EntryType::Sale, &Reference::order("ORD-2"), None)
            .await
            .unwrap_err();
        match err.as_domain() {
            Some(CoreError::InsufficientStock {
                available, requested, ..
            }) => {
                assert_eq!(*available, 3);
                assert_eq!(*requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 3);
        assert!(db.ledger().latest(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backorder_allows_negative() {
        let db = test_db().await;
        let id = seed_item(&db, "SKU-C", 1, true, true).await;
        let engine = db.adjustments();

        let out = engine
            .deduct(&id, 4, EntryType::Sale, &Reference::order("ORD-3"), None)
            .await
            .unwrap();
        assert_eq!(out, AdjustmentOutcome::Applied { before: 1, after: -3 });
    }

    #[tokio::test]
    async fn test_untracked_item_is_skipped_not_error() {
        let db = test_db().await;
        let id = seed_item(&db, "SKU-D", 0, false, false).await;
        let engine = db.adjustments();

        let out = engine
            .deduct(&id, 99, EntryType::Sale, &Reference::order("ORD-4"), None)
            .await
            .unwrap();
        assert!(out.is_skipped());
        assert!(db.ledger().latest(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_absolute_is_idempotent() {
        let db = test_db().await;
        let id = seed_item(&db, "SKU-E", 8, false, true).await;
        let engine = db.adjustments();
        let reference = Reference::sync_run("run-1");

        let first = engine
            .set_absolute(&id, 50, EntryType::Sync, &reference)
            .await
            .unwrap();
        assert_eq!(first, AdjustmentOutcome::Applied { before: 8, after: 50 });
        assert_eq!(db.ledger().count_for_item(&id).await.unwrap(), 1);

        let second = engine
            .set_absolute(&id, 50, EntryType::Sync, &reference)
            .await
            .unwrap();
        assert_eq!(second, AdjustmentOutcome::Applied { before: 50, after: 50 });
        // Second application appended nothing.
        assert_eq!(db.ledger().count_for_item(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_low_stock_scenario() {
        // Item at 20, threshold 10: deduct 15 → 5 (low), add 3 → 8 (low),
        // set_absolute 50 → delta +42 (not low).
        let db = test_db().await;
        let id = seed_item(&db, "SKU-F", 20, false, true).await;
        let engine = db.adjustments();

        engine
            .deduct(&id, 15, EntryType::Sale, &Reference::order("O1"), None)
            .await
            .unwrap();
        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 5);
        assert!(item.is_low_stock());

        engine
            .add(&id, 3, EntryType::Return, &Reference::order("O1"), None)
            .await
            .unwrap();
        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 8);
        assert!(item.is_low_stock());

        let out = engine
            .set_absolute(&id, 50, EntryType::Sync, &Reference::sync_run("R1"))
            .await
            .unwrap();
        assert_eq!(out, AdjustmentOutcome::Applied { before: 8, after: 50 });
        let latest = db.ledger().latest(&id).await.unwrap().unwrap();
        assert_eq!(latest.delta_quantity, 42);
        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        assert!(!item.is_low_stock());

        let report = db.items().low_stock_report(10).await.unwrap();
        assert!(report.iter().all(|i| i.id != id));
    }

    #[tokio::test]
    async fn test_batch_rolls_back_on_failure() {
        let db = test_db().await;
        let a = seed_item(&db, "SKU-G1", 10, false, true).await;
        let b = seed_item(&db, "SKU-G2", 10, false, true).await;
        let c = seed_item(&db, "SKU-G3", 1, false, true).await; // will fail
        let engine = db.adjustments();

        let lines: Vec<BatchLine> = [(a.clone(), 5), (b.clone(), 5), (c.clone(), 5)]
            .into_iter()
            .map(|(item_id, quantity)| BatchLine {
                item_id,
                quantity,
                entry_type: EntryType::Sale,
                reference: Reference::order("ORD-9"),
            })
            .collect();

        let results = engine.apply_batch(&lines, Some("bob")).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].result.is_ok());
        assert!(results[1].result.is_ok());
        assert!(matches!(
            results[2].result,
            Err(CoreError::InsufficientStock { .. })
        ));

        // Nothing committed, not even the lines that individually succeeded.
        for id in [&a, &b, &c] {
            let item = db.items().get_by_id(id).await.unwrap().unwrap();
            assert!(item.current_quantity == 10 || item.current_quantity == 1);
            assert!(db.ledger().latest(id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_batch_commits_when_all_lines_succeed() {
        let db = test_db().await;
        let a = seed_item(&db, "SKU-H1", 10, false, true).await;
        let b = seed_item(&db, "SKU-H2", 10, false, true).await;
        let engine = db.adjustments();

        let lines: Vec<BatchLine> = [(a.clone(), 4), (b.clone(), 6)]
            .into_iter()
            .map(|(item_id, quantity)| BatchLine {
                item_id,
                quantity,
                entry_type: EntryType::Sale,
                reference: Reference::order("ORD-10"),
            })
            .collect();

        let results = engine.apply_batch(&lines, None).await.unwrap();
        assert!(results.iter().all(|r| r.result.is_ok()));

        assert_eq!(
            db.items().get_by_id(&a).await.unwrap().unwrap().current_quantity,
            6
        );
        assert_eq!(
            db.items().get_by_id(&b).await.unwrap().unwrap().current_quantity,
            4
        );
    }

    #[tokio::test]
    async fn test_concurrent_deducts_yield_one_success() {
        // Two concurrent deduct(1) against quantity 1, backorder off:
        // exactly one success and one InsufficientStock, never two successes.
        // File-backed DB with several connections so both tasks really race.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let db = Database::new(DbConfig::new(&path).max_connections(4))
            .await
            .unwrap();
        let id = seed_item(&db, "SKU-RACE", 1, false, true).await;

        let e1 = db.adjustments();
        let e2 = db.adjustments();
        let id1 = id.clone();
        let id2 = id.clone();

        let t1 = tokio::spawn(async move {
            e1.deduct(&id1, 1, EntryType::Sale, &Reference::order("A"), None)
                .await
        });
        let t2 = tokio::spawn(async move {
            e2.deduct(&id2, 1, EntryType::Sale, &Reference::order("B"), None)
                .await
        });

        let r1 = t1.await.unwrap();
        let r2 = t2.await.unwrap();

        let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one deduction must win: {r1:?} {r2:?}");

        let loser = if r1.is_err() { r1 } else { r2 };
        assert!(matches!(
            loser.unwrap_err().as_domain(),
            Some(CoreError::InsufficientStock { .. })
        ));

        let item = db.items().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 0);
        assert_eq!(db.ledger().count_for_item(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let db = test_db().await;
        let err = db
            .adjustments()
            .add("missing", 1, EntryType::Restock, &Reference::new("import", "I1"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::ItemNotFound(_))
        ));
    }
}
