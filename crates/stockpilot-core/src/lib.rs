//! # stockpilot-core: Pure Domain Logic for StockPilot
//!
//! This crate is the **heart** of StockPilot. It contains the inventory
//! domain model as pure types and functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       StockPilot Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockpilot-sync (Engine Layer)                 │   │
//! │  │    Adapters ──► Reconciler ──► Orchestrator ──► Alerts          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  stockpilot-db (Storage Layer)                   │   │
//! │  │    Ledger store, adjustment engine, repositories                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ stockpilot-core (THIS CRATE) ★                    │   │
//! │  │                                                                  │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌────────────┐                 │   │
//! │  │   │   types   │  │ validation │  │   error    │                 │   │
//! │  │   │ StockItem │  │   rules    │  │  taxonomy  │                 │   │
//! │  │   │  Ledger   │  │   checks   │  │            │                 │   │
//! │  │   └───────────┘  └────────────┘  └────────────┘                 │   │
//! │  │                                                                  │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS             │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (StockItem, LedgerEntry, SyncRun, etc.)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Explicit Errors**: All errors are typed, never strings or panics
//! 4. **Append-Only Ledger**: quantity mutations exist only as ledger deltas

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a SKU.
///
/// ## Business Reason
/// Matches the longest SKU observed across supported vendor catalogs,
/// with headroom. Anything longer is almost certainly a mis-mapped field.
pub const MAX_SKU_LEN: usize = 64;

/// Maximum absolute quantity accepted by a single adjustment.
///
/// ## Business Reason
/// Prevents fat-finger corrections (e.g., 1000000 instead of 100) and
/// bounds the damage a malformed external payload can do in one record.
pub const MAX_ADJUSTMENT_QUANTITY: i64 = 1_000_000;

/// Default low-stock threshold for items created as sync placeholders.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 0;
