//! # CSV Adapter
//!
//! Decodes headered CSV exports.
//!
//! ## Expected Shape
//! ```text
//! sku,quantity,price,name
//! COKE-330,120,0.99,Coca Cola 330ml
//! CHIP-50,45,,Potato Chips 50g
//! ```
//! `sku` and `quantity` are required per row; `price` and `name` are
//! optional columns. Rows with a missing SKU or an unparseable quantity
//! are dropped and counted as malformed.

use serde::Deserialize;
use tracing::warn;

use super::{parse_price_cents, parse_quantity, ParseContext, ParseOutput, SourceAdapter};
use crate::error::{SyncError, SyncResult};
use stockpilot_core::ExternalSourceRecord;

#[derive(Debug, Deserialize)]
struct CsvRow {
    sku: String,
    quantity: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Adapter for headered CSV stock exports.
pub struct CsvAdapter;

impl SourceAdapter for CsvAdapter {
    fn parse(&self, raw: &[u8], ctx: &ParseContext) -> SyncResult<ParseOutput> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(raw);

        // Reject payloads without the required columns outright; that is
        // a wrong export, not a few bad rows.
        let headers = reader
            .headers()
            .map_err(|e| format_error(ctx, format!("unreadable header row: {e}")))?
            .clone();
        for required in ["sku", "quantity"] {
            if !headers.iter().any(|h| h == required) {
                return Err(format_error(ctx, format!("missing column '{required}'")));
            }
        }

        let mut records = Vec::new();
        let mut malformed = 0i64;

        for row in reader.deserialize::<CsvRow>() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(source_id = %ctx.source_id, "Dropping malformed CSV row: {e}");
                    malformed += 1;
                    continue;
                }
            };

            let quantity = match parse_quantity(&row.quantity) {
                Some(q) => q,
                None => {
                    warn!(
                        source_id = %ctx.source_id,
                        sku = %row.sku,
                        "Dropping row with unparseable quantity"
                    );
                    malformed += 1;
                    continue;
                }
            };
            if row.sku.is_empty() {
                malformed += 1;
                continue;
            }

            records.push(ExternalSourceRecord {
                external_sku: row.sku,
                quantity,
                price_cents: row.price.as_deref().and_then(parse_price_cents),
                name: row.name.filter(|n| !n.is_empty()),
                source_id: ctx.source_id.clone(),
                fetched_at: ctx.fetched_at,
            });
        }

        Ok(ParseOutput { records, malformed })
    }
}

fn format_error(ctx: &ParseContext, message: String) -> SyncError {
    SyncError::Format {
        source_id: ctx.source_id.clone(),
        message,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> SyncResult<ParseOutput> {
        CsvAdapter.parse(payload.as_bytes(), &ParseContext::new("pos-main"))
    }

    #[test]
    fn test_parses_well_formed_export() {
        let out = parse(
            "sku,quantity,price,name\n\
             COKE-330,120,0.99,Coca Cola 330ml\n\
             CHIP-50,45,,Potato Chips 50g\n",
        )
        .unwrap();

        assert_eq!(out.malformed, 0);
        assert_eq!(out.records.len(), 2);

        let coke = &out.records[0];
        assert_eq!(coke.external_sku, "COKE-330");
        assert_eq!(coke.quantity, 120);
        assert_eq!(coke.price_cents, Some(99));
        assert_eq!(coke.name.as_deref(), Some("Coca Cola 330ml"));
        assert_eq!(coke.source_id, "pos-main");

        assert_eq!(out.records[1].price_cents, None);
    }

    #[test]
    fn test_bad_rows_are_counted_not_fatal() {
        let out = parse(
            "sku,quantity\n\
             GOOD-1,10\n\
             BAD-1,lots\n\
             ,5\n\
             GOOD-2,20\n",
        )
        .unwrap();

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.malformed, 2);
        assert_eq!(out.records[1].external_sku, "GOOD-2");
    }

    #[test]
    fn test_missing_required_column_is_format_error() {
        let err = parse("code,amount\nA,1\n").unwrap_err();
        assert!(matches!(err, SyncError::Format { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_header_only_payload_is_empty_not_error() {
        let out = parse("sku,quantity,price,name\n").unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.malformed, 0);
    }
}
