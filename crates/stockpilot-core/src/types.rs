//! # Domain Types
//!
//! Core domain types used throughout StockPilot.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │   StockItem     │   │   LedgerEntry   │   │      SyncRun        │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)          │   │
//! │  │  sku (business) │   │  item_id (FK)   │   │  source_id          │   │
//! │  │  current_qty    │   │  delta/after    │   │  created/updated/   │   │
//! │  │  allow_backorder│   │  seq (gap-free) │   │  failed counts      │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │   EntryType     │   │  SyncRunStatus  │   │ ExternalSourceRecord│   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  Sale           │   │  Pending        │   │  canonical shape    │   │
//! │  │  Return         │   │  Processing     │   │  every adapter      │   │
//! │  │  Adjustment     │   │  Completed      │   │  normalizes into    │   │
//! │  │  Restock, Sync  │   │  Failed         │   │                     │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, source_id, etc.) - human-readable, potentially mutable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Stock Item
// =============================================================================

/// Where a stock item came from.
///
/// Items created by a sync pass as SKU placeholders are marked `Sync`;
/// only those may have name/price refreshed by later syncs. Manually
/// curated metadata is never clobbered by external data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    /// Created by an operator or the product catalog.
    Manual,
    /// Created as a placeholder by a reconciliation pass.
    Sync,
}

/// A sellable unit whose quantity the ledger governs.
///
/// ## Invariants
/// - `current_quantity >= 0` unless `allow_backorder`
/// - `current_quantity` is authoritative only when `track_inventory`
/// - mutated only through the adjustment engine, never directly
/// - never hard-deleted (soft-deactivated via `is_active`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockItem {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier, unique among active items.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Whether quantity is tracked for this item at all.
    /// When false, adjustments are skipped (not errors).
    pub track_inventory: bool,

    /// Allow deductions past zero (negative quantity).
    pub allow_backorder: bool,

    /// Current derived quantity. Always equals the `quantity_after` of the
    /// item's most recent ledger entry.
    pub current_quantity: i64,

    /// Items at or below this threshold appear on the low-stock report.
    pub low_stock_threshold: i64,

    /// Unit price in cents, if known.
    pub price_cents: Option<i64>,

    /// Whether this item was created manually or as a sync placeholder.
    pub origin: ItemOrigin,

    /// Soft-delete flag.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Returns true if the item is at or below its low-stock threshold.
    /// Untracked items are never low-stock.
    pub fn is_low_stock(&self) -> bool {
        self.track_inventory && self.current_quantity <= self.low_stock_threshold
    }

    /// Checks whether `quantity` units can be deducted.
    pub fn can_deduct(&self, quantity: i64) -> bool {
        if !self.track_inventory {
            return true;
        }
        if self.current_quantity >= quantity {
            return true;
        }
        self.allow_backorder
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// Why a quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Order fulfillment deduction.
    Sale,
    /// Customer return (add back).
    Return,
    /// Manual administrative correction.
    Adjustment,
    /// Vendor delivery / bulk import.
    Restock,
    /// Reconciliation against an external source.
    Sync,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryType::Sale => "sale",
            EntryType::Return => "return",
            EntryType::Adjustment => "adjustment",
            EntryType::Restock => "restock",
            EntryType::Sync => "sync",
        };
        write!(f, "{s}")
    }
}

/// What a ledger entry points back at: the order, import, sync run, or
/// admin action that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Kind of referent: "order", "sync_run", "import", "manual", "webhook".
    pub kind: String,
    /// Identifier of the referent in its own namespace.
    pub id: String,
}

impl Reference {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Reference {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Reference to an order (fulfillment / cancellation).
    pub fn order(id: impl Into<String>) -> Self {
        Reference::new("order", id)
    }

    /// Reference to a sync run against an external source.
    pub fn sync_run(id: impl Into<String>) -> Self {
        Reference::new("sync_run", id)
    }

    /// Reference to a verified webhook event.
    pub fn webhook(id: impl Into<String>) -> Self {
        Reference::new("webhook", id)
    }
}

/// One immutable record in the append-only quantity ledger.
///
/// ## Invariants
/// - `quantity_after = quantity_before + delta_quantity`
/// - `quantity_before` equals the previous entry's `quantity_after` for
///   the same item (causal chain)
/// - `seq` is strictly increasing per item with no gaps
/// - never mutated or deleted after insert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LedgerEntry {
    pub id: String,
    pub item_id: String,
    /// Per-item sequence number, assigned inside the mutation transaction.
    pub seq: i64,
    pub delta_quantity: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub entry_type: EntryType,
    /// Kind of referent ("order", "sync_run", ...).
    pub reference_kind: String,
    /// Identifier of the referent.
    pub reference_id: String,
    /// Operator responsible, for audit attribution. None for system paths.
    pub actor: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Adjustment Outcome
// =============================================================================

/// Result of a single adjustment operation.
///
/// A skip (tracking disabled) is a first-class outcome rather than an
/// error: order fulfillment over a mix of tracked and untracked items
/// must not fail on the untracked ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AdjustmentOutcome {
    /// The adjustment was applied and a ledger entry written
    /// (unless `before == after`, which appends nothing).
    Applied { before: i64, after: i64 },
    /// The item does not track inventory; nothing was written.
    Skipped,
}

impl AdjustmentOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, AdjustmentOutcome::Skipped)
    }

    /// Before/after quantities, when the adjustment applied.
    pub fn quantities(&self) -> Option<(i64, i64)> {
        match self {
            AdjustmentOutcome::Applied { before, after } => Some((*before, *after)),
            AdjustmentOutcome::Skipped => None,
        }
    }
}

// =============================================================================
// Batch Adjustments
// =============================================================================

/// One line of a batch adjustment (e.g., one order line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchLine {
    pub item_id: String,
    /// Units to deduct (positive). Adds use a negative-free API instead.
    pub quantity: i64,
    pub entry_type: EntryType,
    pub reference: Reference,
}

/// Per-line result of a batch adjustment.
///
/// Operators get one result per line so a failed batch pinpoints exactly
/// which line failed. When any line fails, the whole batch rolls back and
/// even `Ok` lines were not committed.
#[derive(Debug, Clone)]
pub struct BatchLineResult {
    pub item_id: String,
    pub result: Result<AdjustmentOutcome, crate::error::CoreError>,
}

// =============================================================================
// External Source Record
// =============================================================================

/// Canonical normalized snapshot produced by every source adapter.
///
/// Heterogeneous vendor/POS payloads (CSV rows, XML nodes, JSON objects)
/// all collapse into this one shape before reconciliation sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSourceRecord {
    /// SKU as reported by the external system.
    pub external_sku: String,
    /// Absolute quantity the source claims.
    pub quantity: i64,
    /// Unit price in cents, when the source reports one.
    pub price_cents: Option<i64>,
    /// Display name, when the source reports one.
    pub name: Option<String>,
    /// Which configured source produced this record.
    pub source_id: String,
    /// When the payload was fetched.
    pub fetched_at: DateTime<Utc>,
}

// =============================================================================
// Sync Run
// =============================================================================

/// Lifecycle of one reconciliation pass.
///
/// ```text
/// pending ──► processing ──► completed   (normal, even with failed records)
///                       └──► failed      (fetch/parse threw)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Bookkeeping for one reconciliation pass against one external source.
///
/// Per-record failures are tallied in `failed` but do not abort the run;
/// partial success is the normal terminal state for large catalogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SyncRun {
    pub id: String,
    pub source_id: String,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Records the adapter produced.
    pub total_records: i64,
    /// Placeholder items created by this run.
    pub created: i64,
    /// Existing items reconciled (including delta-0 no-ops).
    pub updated: i64,
    /// Unresolvable SKUs and per-record errors.
    pub failed: i64,
    /// Structured error payload (JSON), set only when status is Failed.
    pub error: Option<String>,
}

/// Structured error payload stored on a failed run and handed to alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    /// Stable machine-readable category ("auth", "format", "network", ...).
    pub category: String,
    pub message: String,
    /// Attempts made before giving up.
    pub attempts: u32,
}

// =============================================================================
// Unit Tests
// =============================================================================
