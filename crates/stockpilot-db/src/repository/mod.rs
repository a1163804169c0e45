//! # Repository Layer
//!
//! One repository per aggregate, each holding a cheap clone of the pool:
//!
//! - [`item::StockItemRepository`] - stock items (lookup, placeholders,
//!   low-stock report, soft-deactivation)
//! - [`ledger::LedgerRepository`] - append-only quantity ledger (history,
//!   latest); appends happen only inside adjustment transactions
//! - [`sync_run::SyncRunRepository`] - reconciliation pass bookkeeping
//!
//! Quantity mutations never go through repositories directly; they go
//! through [`crate::adjustment::AdjustmentEngine`].

pub mod item;
pub mod ledger;
pub mod sync_run;
