//! # stockpilot-sync: External Synchronization Engine
//!
//! Reconciles the authoritative stock ledger against external vendor
//! and POS systems.
//!
//! ## Engine Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        stockpilot-sync                                  │
//! │                                                                         │
//! │   pull:  client ──► adapter (csv/xml/json/generic) ──┐                 │
//! │                                                       ▼                 │
//! │   push:  webhook (HMAC-verified) ────────────► reconciler              │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │            orchestrator (runs, worker pool, alerts)  adjustment engine │
//! │                                                       (stockpilot-db)  │
//! │                                                                         │
//! │   secrets: credentials sealed at rest, unsealed just-in-time           │
//! │   config:  TOML + env overrides                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - Every external quantity change flows through the adjustment
//!   engine: full before/after audit, never a blind overwrite
//! - Last writer wins: the most recent reported absolute quantity is
//!   applied as a signed delta
//! - Re-running any payload is a no-op (delta-0 appends nothing)
//! - Per-record failures are tallied; only fetch/parse failures fail a
//!   whole run

pub mod adapter;
pub mod alerts;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod secrets;
pub mod telemetry;
pub mod webhook;

pub use alerts::{AlertSink, TracingAlertSink};
pub use client::SourceClient;
pub use config::{AuthKind, FieldMap, RetryConfig, SourceConfig, SourceFormat, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{CancelHandle, SyncOrchestrator};
pub use reconcile::{ApplyOutcome, Reconciler};
pub use secrets::{Credential, SecretStore};
pub use webhook::{WebhookEvent, WebhookProcessor};
