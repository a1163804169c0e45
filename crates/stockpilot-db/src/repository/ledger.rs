//! # Ledger Repository
//!
//! Read access to the append-only quantity ledger, plus the internal
//! append used by adjustment transactions.
//!
//! ## Append-Only Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Ledger Guarantees                                  │
//! │                                                                         │
//! │  • Entries are inserted inside the SAME transaction as the             │
//! │    stock_items quantity update: both commit or both roll back          │
//! │                                                                         │
//! │  • seq is per-item, gap-free: assigned as MAX(seq)+1 inside the        │
//! │    transaction, enforced UNIQUE(item_id, seq)                          │
//! │                                                                         │
//! │  • quantity_after = quantity_before + delta (CHECK constraint)         │
//! │                                                                         │
//! │  • No UPDATE or DELETE statement for this table exists anywhere        │
//! │    in the workspace                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use stockpilot_core::LedgerEntry;

const LEDGER_COLUMNS: &str = "id, item_id, seq, delta_quantity, quantity_before, quantity_after, \
     entry_type, reference_kind, reference_id, actor, note, created_at";

/// Repository for ledger read operations.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Returns the most recent entry for an item, if any.
    ///
    /// Its `quantity_after` always equals the item's `current_quantity`
    /// (the no-drift invariant).
    pub async fn latest(&self, item_id: &str) -> DbResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger WHERE item_id = ?1 ORDER BY seq DESC LIMIT 1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Paginated ledger history for one item, newest first.
    pub async fn history(
        &self,
        item_id: &str,
        limit: u32,
        offset: u32,
    ) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM stock_ledger
            WHERE item_id = ?1
            ORDER BY seq DESC
            LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(item_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Counts entries for an item (for pagination UIs).
    pub async fn count_for_item(&self, item_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_ledger WHERE item_id = ?1")
            .bind(item_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Appends a ledger entry on an open transaction.
///
/// `seq` is assigned here as MAX(seq)+1 for the item; the caller must be
/// inside the same transaction that updates the item quantity, otherwise
/// the causal chain invariant can break.
pub(crate) async fn append_in(
    conn: &mut SqliteConnection,
    entry: &LedgerEntry,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_ledger (
            id, item_id, seq, delta_quantity, quantity_before, quantity_after,
            entry_type, reference_kind, reference_id, actor, note, created_at
        ) VALUES (
            ?1, ?2,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM stock_ledger WHERE item_id = ?2),
            ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
        )
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.item_id)
    .bind(entry.delta_quantity)
    .bind(entry.quantity_before)
    .bind(entry.quantity_after)
    .bind(entry.entry_type)
    .bind(&entry.reference_kind)
    .bind(&entry.reference_id)
    .bind(&entry.actor)
    .bind(&entry.note)
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(())
}
