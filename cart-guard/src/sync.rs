//! UI synchronization
//!
//! A pure projection from the freshest cart and the product forms present on
//! the page to the directives a view layer should apply. Nothing here touches
//! a rendering technology.
//!
//! Forms are matched to lines by variant, never by line position. When
//! several limited lines share a variant, the last one in the cart wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Messages;
use crate::model::{CartSnapshot, VariantId};

/// A product form on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductForm {
    pub variant_id: VariantId,

    /// Value currently in the quantity input, if it parses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_value: Option<u32>,
}

impl ProductForm {
    pub fn new(variant_id: VariantId) -> Self {
        Self {
            variant_id,
            quantity_value: None,
        }
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.quantity_value = Some(value);
        self
    }
}

/// One change a view layer should make
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum UiDirective {
    /// New quantity input ceiling, and a new value when it must change
    SetQuantityBound {
        variant_id: VariantId,
        max: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<u32>,
    },

    /// Show or hide the quantity selector
    SetSelectorVisible { variant_id: VariantId, visible: bool },

    /// Enable or disable add-to-cart and set its label
    SetAddToCart {
        variant_id: VariantId,
        enabled: bool,
        label: String,
    },
}

impl UiDirective {
    pub fn variant_id(&self) -> VariantId {
        match self {
            UiDirective::SetQuantityBound { variant_id, .. }
            | UiDirective::SetSelectorVisible { variant_id, .. }
            | UiDirective::SetAddToCart { variant_id, .. } => *variant_id,
        }
    }
}

/// Project the cart onto the page forms
pub fn project(snapshot: &CartSnapshot, forms: &[ProductForm], messages: &Messages) -> Vec<UiDirective> {
    if forms.is_empty() {
        return Vec::new();
    }

    // variant -> headroom, last applicable line wins
    let mut headroom: BTreeMap<VariantId, u32> = BTreeMap::new();
    for line in &snapshot.lines {
        if let Some(limit) = line.rules.active_limit() {
            headroom.insert(line.variant_id, limit.saturating_sub(line.quantity));
        }
    }

    let mut directives = Vec::new();

    for form in forms {
        let Some(&remaining) = headroom.get(&form.variant_id) else {
            continue;
        };
        let variant_id = form.variant_id;

        if remaining == 0 {
            directives.push(UiDirective::SetQuantityBound {
                variant_id,
                max: 0,
                value: None,
            });
            directives.push(UiDirective::SetSelectorVisible {
                variant_id,
                visible: false,
            });
            directives.push(UiDirective::SetAddToCart {
                variant_id,
                enabled: false,
                label: messages.limit_reached_label.clone(),
            });
        } else {
            let current = form.quantity_value.filter(|v| *v > 0).unwrap_or(1);
            directives.push(UiDirective::SetQuantityBound {
                variant_id,
                max: remaining,
                value: Some(current.min(remaining)),
            });
            directives.push(UiDirective::SetSelectorVisible {
                variant_id,
                visible: true,
            });
            directives.push(UiDirective::SetAddToCart {
                variant_id,
                enabled: true,
                label: messages.add_to_cart_label.clone(),
            });
        }
    }

    directives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CartPayload, WireLineItem};
    use crate::rules::MAX_QUANTITY_KEY;

    fn snapshot(items: Vec<WireLineItem>) -> CartSnapshot {
        CartSnapshot::from_payload(CartPayload {
            items,
            cart_level_discount_applications: vec![],
        })
    }

    #[test]
    fn test_limit_reached_disables_form() {
        let snap = snapshot(vec![WireLineItem::new(30, 300, 5, "Capped").with_property(MAX_QUANTITY_KEY, "5")]);
        let messages = Messages::default();

        let directives = project(&snap, &[ProductForm::new(VariantId(300))], &messages);

        assert_eq!(
            directives,
            vec![
                UiDirective::SetQuantityBound { variant_id: VariantId(300), max: 0, value: None },
                UiDirective::SetSelectorVisible { variant_id: VariantId(300), visible: false },
                UiDirective::SetAddToCart {
                    variant_id: VariantId(300),
                    enabled: false,
                    label: messages.limit_reached_label.clone(),
                },
            ]
        );
    }

    #[test]
    fn test_headroom_restores_form() {
        let snap = snapshot(vec![WireLineItem::new(30, 300, 2, "Capped").with_property(MAX_QUANTITY_KEY, "5")]);
        let messages = Messages::default();

        let directives = project(&snap, &[ProductForm::new(VariantId(300)).with_value(10)], &messages);

        assert_eq!(
            directives[0],
            UiDirective::SetQuantityBound { variant_id: VariantId(300), max: 3, value: Some(3) }
        );
        assert_eq!(
            directives[2],
            UiDirective::SetAddToCart {
                variant_id: VariantId(300),
                enabled: true,
                label: messages.add_to_cart_label.clone(),
            }
        );
    }

    #[test]
    fn test_missing_value_defaults_to_one() {
        let snap = snapshot(vec![WireLineItem::new(30, 300, 1, "Capped").with_property(MAX_QUANTITY_KEY, "4")]);
        let directives = project(&snap, &[ProductForm::new(VariantId(300))], &Messages::default());

        assert_eq!(
            directives[0],
            UiDirective::SetQuantityBound { variant_id: VariantId(300), max: 3, value: Some(1) }
        );
    }

    #[test]
    fn test_no_forms_no_directives() {
        let snap = snapshot(vec![WireLineItem::new(30, 300, 5, "Capped").with_property(MAX_QUANTITY_KEY, "5")]);
        assert!(project(&snap, &[], &Messages::default()).is_empty());
    }

    #[test]
    fn test_unlimited_and_unmatched_lines_are_skipped() {
        let snap = snapshot(vec![
            WireLineItem::new(30, 300, 9, "Free").with_property(MAX_QUANTITY_KEY, "none"),
            WireLineItem::new(31, 310, 1, "Capped").with_property(MAX_QUANTITY_KEY, "2"),
        ]);

        let directives = project(&snap, &[ProductForm::new(VariantId(300))], &Messages::default());
        assert!(directives.is_empty());
    }

    #[test]
    fn test_last_line_for_variant_wins() {
        let snap = snapshot(vec![
            WireLineItem::new(30, 300, 1, "A").with_property(MAX_QUANTITY_KEY, "1"),
            WireLineItem::new(30, 300, 1, "B").with_property(MAX_QUANTITY_KEY, "4"),
        ]);

        let directives = project(&snap, &[ProductForm::new(VariantId(300))], &Messages::default());

        assert_eq!(
            directives[0],
            UiDirective::SetQuantityBound { variant_id: VariantId(300), max: 3, value: Some(1) }
        );
    }
}
