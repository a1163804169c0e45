//! # XML Adapter
//!
//! Decodes XML stock documents.
//!
//! ## Expected Shape
//! ```text
//! <stock>
//!   <item>
//!     <sku>COKE-330</sku>
//!     <quantity>120</quantity>
//!     <price>0.99</price>          <!-- optional -->
//!     <name>Coca Cola 330ml</name> <!-- optional -->
//!   </item>
//! </stock>
//! ```
//! A document that is not well-formed XML fails the whole parse; items
//! missing a SKU or carrying an unparseable quantity are dropped and
//! counted as malformed.

use serde::Deserialize;
use tracing::warn;

use super::{parse_price_cents, parse_quantity, ParseContext, ParseOutput, SourceAdapter};
use crate::error::{SyncError, SyncResult};
use stockpilot_core::ExternalSourceRecord;

#[derive(Debug, Deserialize)]
struct StockDocument {
    #[serde(default, rename = "item")]
    items: Vec<XmlItem>,
}

#[derive(Debug, Deserialize)]
struct XmlItem {
    #[serde(default)]
    sku: String,
    #[serde(default)]
    quantity: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Adapter for XML stock documents.
pub struct XmlAdapter;

impl SourceAdapter for XmlAdapter {
    fn parse(&self, raw: &[u8], ctx: &ParseContext) -> SyncResult<ParseOutput> {
        let text = std::str::from_utf8(raw).map_err(|_| SyncError::Format {
            source_id: ctx.source_id.clone(),
            message: "payload is not valid UTF-8".into(),
        })?;

        let document: StockDocument =
            quick_xml::de::from_str(text).map_err(|e| SyncError::Format {
                source_id: ctx.source_id.clone(),
                message: format!("invalid XML: {e}"),
            })?;

        let mut records = Vec::with_capacity(document.items.len());
        let mut malformed = 0i64;

        for item in document.items {
            let quantity = match parse_quantity(&item.quantity) {
                Some(q) if !item.sku.trim().is_empty() => q,
                _ => {
                    warn!(
                        source_id = %ctx.source_id,
                        sku = %item.sku,
                        "Dropping malformed XML item"
                    );
                    malformed += 1;
                    continue;
                }
            };

            records.push(ExternalSourceRecord {
                external_sku: item.sku.trim().to_string(),
                quantity,
                price_cents: item.price.as_deref().and_then(parse_price_cents),
                name: item.name.filter(|n| !n.trim().is_empty()),
                source_id: ctx.source_id.clone(),
                fetched_at: ctx.fetched_at,
            });
        }

        Ok(ParseOutput { records, malformed })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
