//! # Generic JSON Adapter
//!
//! Decodes JSON exports whose field names the operator declares in
//! configuration instead of matching our canonical ones.
//!
//! ## Example
//! ```text
//! [sources.field_map]          payload:
//! sku = "itemCode"             [{"itemCode": "COKE-330",
//! quantity = "stockLevel"        "stockLevel": 120,
//! price = "unitPrice"            "unitPrice": "0.99"}]
//! ```
//! The mapping is explicit: a field the map does not name is never
//! read, and the adapter never guesses.

use super::json::{parse_with_keys, FieldKeys};
use super::{ParseContext, ParseOutput, SourceAdapter};
use crate::config::FieldMap;
use crate::error::SyncResult;

/// Adapter for JSON exports with operator-declared field names.
pub struct GenericJsonAdapter {
    map: FieldMap,
}

impl GenericJsonAdapter {
    pub fn new(map: FieldMap) -> Self {
        GenericJsonAdapter { map }
    }
}

impl SourceAdapter for GenericJsonAdapter {
    fn parse(&self, raw: &[u8], ctx: &ParseContext) -> SyncResult<ParseOutput> {
        let keys = FieldKeys {
            sku: &self.map.sku,
            quantity: &self.map.quantity,
            price: self.map.price.as_deref(),
            name: self.map.name.as_deref(),
        };
        parse_with_keys(raw, ctx, &keys)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
