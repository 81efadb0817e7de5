//! CartSnapshot reader
//!
//! The single boundary where wire data becomes typed: titles are decoded,
//! property values stringified and rule metadata parsed. Malformed rules are
//! logged here and nowhere else.

use std::collections::BTreeMap;

use crate::client::CartService;
use crate::error::TransportResult;
use crate::model::{decode_html_entities, property_to_string, CartPayload, CartSnapshot, LineIndex, LineItem};
use crate::rules::LineRules;

/// Fetch the cart and convert it into a snapshot
pub async fn read_snapshot<S: CartService + ?Sized>(service: &S) -> TransportResult<CartSnapshot> {
    let payload = service.fetch_cart().await?;
    Ok(CartSnapshot::from_payload(payload))
}

impl CartSnapshot {
    /// Build a snapshot from a cart payload
    pub fn from_payload(payload: CartPayload) -> Self {
        let lines = payload
            .items
            .into_iter()
            .enumerate()
            .map(|(offset, item)| {
                let index = LineIndex::from_offset(offset);

                let properties: BTreeMap<String, String> = item
                    .properties
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|(k, v)| property_to_string(v).map(|s| (k.clone(), s)))
                    .collect();

                let (rules, malformed) = LineRules::from_properties(&properties);
                for rule in malformed {
                    tracing::warn!(
                        line = %index,
                        product_id = %item.product_id,
                        error = %rule,
                        "Ignoring malformed cart rule"
                    );
                }

                LineItem {
                    index,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                    title: decode_html_entities(&item.title),
                    final_line_price: item.final_line_price,
                    requires_shipping: item.requires_shipping,
                    properties,
                    rules,
                }
            })
            .collect();

        Self {
            lines,
            discount_applications: payload.cart_level_discount_applications,
        }
    }
}
