//! # Source Adapters
//!
//! One adapter per external payload format, all normalizing into the
//! canonical [`ExternalSourceRecord`] shape.
//!
//! ## Normalization Pipeline
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────────────┐
//! │ raw bytes│──►│ SourceAdapter│──►│ Vec<ExternalSource    │──► reconciler
//! │ (fetched)│   │ csv/xml/json │   │       Record>         │
//! └──────────┘   │ /generic     │   └───────────────────────┘
//!                └──────────────┘
//! ```
//!
//! ## Failure Granularity
//! - A payload that cannot be decoded at all (not CSV, invalid XML/JSON)
//!   is a [`SyncError::Format`]: the run fails with a structured error.
//! - Individual rows/objects that fail to parse are *dropped and
//!   counted*; they feed the run's `failed` tally without aborting the
//!   other records.

use chrono::{DateTime, Utc};

use crate::config::{SourceConfig, SourceFormat};
use crate::error::{SyncError, SyncResult};
use stockpilot_core::ExternalSourceRecord;

pub mod csv;
pub mod generic;
pub mod json;
pub mod xml;

// =============================================================================
// Adapter Contract
// =============================================================================

/// Per-fetch context threaded into every record an adapter emits.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
}

impl ParseContext {
    pub fn new(source_id: impl Into<String>) -> Self {
        ParseContext {
            source_id: source_id.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// What parsing one payload produced.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub records: Vec<ExternalSourceRecord>,
    /// Rows/objects dropped because they were individually malformed
    /// (missing SKU, unparseable quantity). Tallied as failed records.
    pub malformed: i64,
}

/// Decodes one source format into canonical records.
pub trait SourceAdapter: Send + Sync {
    fn parse(&self, raw: &[u8], ctx: &ParseContext) -> SyncResult<ParseOutput>;
}

/// Selects the adapter for a configured source.
pub fn adapter_for(source: &SourceConfig) -> SyncResult<Box<dyn SourceAdapter>> {
    match source.format {
        SourceFormat::Csv => Ok(Box::new(csv::CsvAdapter)),
        SourceFormat::Xml => Ok(Box::new(xml::XmlAdapter)),
        SourceFormat::Json => Ok(Box::new(json::JsonAdapter)),
        SourceFormat::Generic => {
            let map = source.field_map.clone().ok_or_else(|| {
                SyncError::InvalidConfig(format!(
                    "source {}: format 'generic' requires a field_map",
                    source.id
                ))
            })?;
            Ok(Box::new(generic::GenericJsonAdapter::new(map)))
        }
    }
}

// =============================================================================
// Shared Field Parsing
// =============================================================================

/// Parses a quantity field. Sources report whole units; anything else
/// is malformed.
pub(crate) fn parse_quantity(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Parses a decimal price ("12.34", "5", "0.99") into cents without
/// going through floating point. Negative or unparseable prices are
/// treated as absent.
pub(crate) fn parse_price_cents(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('-') {
        return None;
    }

    let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
    let whole: i64 = whole.parse().ok()?;
    let cents = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.get(..2)?.parse::<i64>().ok()?,
    };
    // Prices large enough to overflow i64 cents are garbage input,
    // not a reason to bring the run down.
    whole.checked_mul(100)?.checked_add(cents)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_cents() {
        assert_eq!(parse_price_cents("12.34"), Some(1234));
        assert_eq!(parse_price_cents("5"), Some(500));
        assert_eq!(parse_price_cents("0.99"), Some(99));
        assert_eq!(parse_price_cents("3.5"), Some(350));
        assert_eq!(parse_price_cents(" 7.00 "), Some(700));
        assert_eq!(parse_price_cents(""), None);
        assert_eq!(parse_price_cents("-1.00"), None);
        assert_eq!(parse_price_cents("abc"), None);
    }

    #[test]
    fn test_parse_price_cents_rejects_values_past_i64_cents() {
        // whole part fits in i64 but the cents conversion would not
        assert_eq!(parse_price_cents("92233720368547759.00"), None);
        assert_eq!(parse_price_cents("92233720368547758.08"), None);
        // largest representable price still parses
        assert_eq!(
            parse_price_cents("92233720368547758.07"),
            Some(i64::MAX)
        );
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("42"), Some(42));
        assert_eq!(parse_quantity(" -3 "), Some(-3));
        assert_eq!(parse_quantity("4.5"), None);
        assert_eq!(parse_quantity("many"), None);
    }
}
