//! # JSON Adapter
//!
//! Decodes JSON stock exports.
//!
//! ## Expected Shape
//! Either a top-level array or an object wrapping one under `items`:
//! ```text
//! [{"sku": "COKE-330", "quantity": 120, "price": 0.99, "name": "..."}]
//! {"items": [{"sku": "CHIP-50", "quantity": 45}]}
//! ```
//! Quantities and prices may arrive as JSON numbers or numeric strings;
//! vendor exports are not picky and neither are we. Objects missing a
//! SKU or quantity are dropped and counted as malformed.

use serde_json::Value;
use tracing::warn;

use super::{parse_price_cents, parse_quantity, ParseContext, ParseOutput, SourceAdapter};
use crate::error::{SyncError, SyncResult};
use stockpilot_core::ExternalSourceRecord;

/// Field names one JSON object is read with. The plain JSON adapter
/// uses the canonical names; the generic adapter substitutes the
/// operator-declared ones.
pub(crate) struct FieldKeys<'a> {
    pub sku: &'a str,
    pub quantity: &'a str,
    pub price: Option<&'a str>,
    pub name: Option<&'a str>,
}

const CANONICAL_KEYS: FieldKeys<'static> = FieldKeys {
    sku: "sku",
    quantity: "quantity",
    price: Some("price"),
    name: Some("name"),
};

/// Adapter for JSON stock exports with canonical field names.
pub struct JsonAdapter;

impl SourceAdapter for JsonAdapter {
    fn parse(&self, raw: &[u8], ctx: &ParseContext) -> SyncResult<ParseOutput> {
        parse_with_keys(raw, ctx, &CANONICAL_KEYS)
    }
}

/// Shared JSON walk used by both the canonical and generic adapters.
pub(crate) fn parse_with_keys(
    raw: &[u8],
    ctx: &ParseContext,
    keys: &FieldKeys<'_>,
) -> SyncResult<ParseOutput> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| SyncError::Format {
        source_id: ctx.source_id.clone(),
        message: format!("invalid JSON: {e}"),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SyncError::Format {
                    source_id: ctx.source_id.clone(),
                    message: "expected a top-level array or an 'items' array".into(),
                })
            }
        },
        _ => {
            return Err(SyncError::Format {
                source_id: ctx.source_id.clone(),
                message: "expected a top-level array or object".into(),
            })
        }
    };

    let mut records = Vec::with_capacity(items.len());
    let mut malformed = 0i64;

    for item in items {
        match record_from_object(&item, ctx, keys) {
            Some(record) => records.push(record),
            None => {
                warn!(source_id = %ctx.source_id, "Dropping malformed JSON object");
                malformed += 1;
            }
        }
    }

    Ok(ParseOutput { records, malformed })
}

fn record_from_object(
    item: &Value,
    ctx: &ParseContext,
    keys: &FieldKeys<'_>,
) -> Option<ExternalSourceRecord> {
    let obj = item.as_object()?;

    let sku = obj.get(keys.sku)?.as_str()?.trim();
    if sku.is_empty() {
        return None;
    }
    let quantity = field_as_quantity(obj.get(keys.quantity)?)?;

    let price_cents = keys
        .price
        .and_then(|k| obj.get(k))
        .and_then(field_as_price_cents);
    let name = keys
        .name
        .and_then(|k| obj.get(k))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Some(ExternalSourceRecord {
        external_sku: sku.to_string(),
        quantity,
        price_cents,
        name,
        source_id: ctx.source_id.clone(),
        fetched_at: ctx.fetched_at,
    })
}

fn field_as_quantity(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_quantity(s),
        _ => None,
    }
}

fn field_as_price_cents(value: &Value) -> Option<i64> {
    match value {
        // Numbers round-trip through their decimal rendering so "0.99"
        // and 0.99 take the same (float-free) path.
        Value::Number(n) => parse_price_cents(&n.to_string()),
        Value::String(s) => parse_price_cents(s),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> SyncResult<ParseOutput> {
        JsonAdapter.parse(payload.as_bytes(), &ParseContext::new("pos-main"))
    }

    #[test]
    fn test_parses_top_level_array() {
        let out = parse(
            r#"[
                {"sku": "COKE-330", "quantity": 120, "price": 0.99, "name": "Coca Cola 330ml"},
                {"sku": "CHIP-50", "quantity": "45"}
            ]"#,
        )
        .unwrap();

        assert_eq!(out.malformed, 0);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].price_cents, Some(99));
        assert_eq!(out.records[1].quantity, 45);
    }

    #[test]
    fn test_parses_items_wrapper() {
        let out = parse(r#"{"items": [{"sku": "A-1", "quantity": 7}]}"#).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].external_sku, "A-1");
    }

    #[test]
    fn test_malformed_objects_counted() {
        let out = parse(
            r#"[
                {"sku": "OK-1", "quantity": 5},
                {"sku": "BAD-1"},
                {"quantity": 3},
                {"sku": "BAD-2", "quantity": "soon"},
                {"sku": "OK-2", "quantity": 9}
            ]"#,
        )
        .unwrap();

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.malformed, 3);
    }

    #[test]
    fn test_invalid_json_is_format_error() {
        assert!(matches!(
            parse("not json at all").unwrap_err(),
            SyncError::Format { .. }
        ));
    }

    #[test]
    fn test_wrong_top_level_shape_is_format_error() {
        assert!(matches!(
            parse(r#"{"stock": 42}"#).unwrap_err(),
            SyncError::Format { .. }
        ));
    }

    #[test]
    fn test_string_price_parses() {
        let out = parse(r#"[{"sku": "P-1", "quantity": 1, "price": "12.34"}]"#).unwrap();
        assert_eq!(out.records[0].price_cents, Some(1234));
    }
}
