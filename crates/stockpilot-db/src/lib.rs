//! # stockpilot-db: Ledger Store + Adjustment Engine
//!
//! All database operations for StockPilot live here: the stock item
//! table, the append-only quantity ledger, sync-run bookkeeping, and the
//! adjustment engine that is the only legal mutation path for quantities.
//!
//! ## Layer Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stockpilot-sync (adapters, reconciler, orchestrator)                   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  stockpilot-db (THIS CRATE)                                             │
//! │  ├── pool        - explicit Database handle (no global pool)            │
//! │  ├── migrations  - embedded SQL migrations                              │
//! │  ├── repository  - items / ledger / sync runs                           │
//! │  └── adjustment  - atomic deduct/add/set_absolute + batches             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  SQLite (WAL mode) - single authoritative relational store              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Writer Serialization
//! Any two writers touching the same stock item serialize through the
//! SQLite write lock; each adjustment additionally carries a
//! compare-and-set guard on the quantity it read, retried once on a miss.
//! That pair is the design's race-condition defense. No ordering is
//! promised across *different* items.

pub mod adjustment;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use adjustment::AdjustmentEngine;
pub use error::{AdjustResult, AdjustmentError, DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::item::StockItemRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::sync_run::SyncRunRepository;
