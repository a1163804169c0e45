//! # Webhook Intake
//!
//! Push-style inventory events from external systems.
//!
//! ## Verification
//! ```text
//! signature header = hex( HMAC-SHA256( shared_secret, raw_body_bytes ) )
//! ```
//! The MAC is computed over the raw body *before* any JSON parsing, and
//! compared in constant time. An unverifiable event is rejected and
//! never touches the ledger.
//!
//! Verified events flow through the same reconciler as pull syncs, so
//! every webhook mutation carries the full before/after audit trail.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::reconcile::{ApplyOutcome, Reconciler};
use stockpilot_core::{ExternalSourceRecord, Reference};
use stockpilot_db::Database;

type HmacSha256 = Hmac<Sha256>;

/// One inventory-change event as posted by an external system.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Sender-assigned id, recorded as the ledger reference.
    pub event_id: String,
    /// Which configured source sent this.
    pub source_id: String,
    pub sku: String,
    /// Absolute quantity the sender now holds.
    pub quantity: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
}

/// Verifies and applies webhook events.
pub struct WebhookProcessor {
    signing_key: Vec<u8>,
    reconciler: Reconciler,
}

impl WebhookProcessor {
    pub fn new(db: Database, signing_key: &[u8], create_missing_items: bool) -> Self {
        WebhookProcessor {
            signing_key: signing_key.to_vec(),
            reconciler: Reconciler::new(db, create_missing_items),
        }
    }

    /// Checks the body signature without applying anything.
    pub fn verify(&self, body: &[u8], signature_hex: &str) -> SyncResult<()> {
        let claimed = hex::decode(signature_hex.trim())
            .map_err(|_| SyncError::SignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|_| SyncError::Secret("empty webhook signing key".into()))?;
        mac.update(body);

        // verify_slice compares in constant time.
        mac.verify_slice(&claimed)
            .map_err(|_| SyncError::SignatureInvalid)
    }

    /// Verifies the signature, then applies the event through the
    /// reconciler. Returns the reconcile outcome of the single record.
    pub async fn handle(&self, body: &[u8], signature_hex: &str) -> SyncResult<ApplyOutcome> {
        if let Err(e) = self.verify(body, signature_hex) {
            warn!("Rejected webhook with bad signature");
            return Err(e);
        }

        // Same taxonomy as pull syncs: an undecodable payload is a
        // format error. The sender is only known after parsing, so the
        // intake channel stands in as the source id.
        let event: WebhookEvent = serde_json::from_slice(body).map_err(|e| SyncError::Format {
            source_id: "webhook".to_string(),
            message: format!("event body is not valid JSON: {e}"),
        })?;
        info!(
            event_id = %event.event_id,
            source_id = %event.source_id,
            sku = %event.sku,
            "Applying verified webhook event"
        );

        let record = ExternalSourceRecord {
            external_sku: event.sku,
            quantity: event.quantity,
            price_cents: event.price_cents,
            name: event.name,
            source_id: event.source_id,
            fetched_at: chrono::Utc::now(),
        };
        self.reconciler
            .apply_record(&record, &Reference::webhook(&event.event_id))
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
