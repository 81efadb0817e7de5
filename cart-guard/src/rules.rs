//! Merchant rules carried on cart line properties
//!
//! Rules are not stored anywhere; each line declares its own through two
//! hidden properties:
//!
//! | Property | Format | Meaning |
//! |----------|--------|---------|
//! | `_produits_incompatibles` | `"20,31"` | products that may not share the cart |
//! | `_max_quantity` | `"5"` or `"none"` | per-line purchasable ceiling |
//!
//! Both are parsed here exactly once, when a snapshot is read. A value that
//! does not parse is reported as a [`MalformedRule`] and the rule is dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MalformedRule;
use crate::model::ProductId;

/// Property holding the comma-separated incompatible product IDs
pub const INCOMPATIBLE_PRODUCTS_KEY: &str = "_produits_incompatibles";

/// Property holding the maximum quantity (or the `none` sentinel)
pub const MAX_QUANTITY_KEY: &str = "_max_quantity";

/// Sentinel disabling the quantity limit
pub const UNLIMITED_SENTINEL: &str = "none";

/// Declared quantity ceiling of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxQuantity {
    /// At most this many units
    Limited(u32),
    /// Explicitly uncapped (`"none"`)
    Unlimited,
}

impl MaxQuantity {
    /// The numeric limit, if one applies
    pub fn limit(self) -> Option<u32> {
        match self {
            MaxQuantity::Limited(n) => Some(n),
            MaxQuantity::Unlimited => None,
        }
    }
}

/// A single constraint derived from one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintRule {
    Incompatibility {
        product_id: ProductId,
        blocked_product_id: ProductId,
    },
    MaxQuantity {
        product_id: ProductId,
        limit: u32,
    },
}

/// Rules declared by one line, already typed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRules {
    /// Products this line may not coexist with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incompatible_with: Vec<ProductId>,

    /// Declared ceiling; `None` when the property is absent or malformed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<MaxQuantity>,
}

impl LineRules {
    /// Parse the rule properties of a line.
    ///
    /// Never fails: malformed values are returned alongside so the caller
    /// can log them, and the corresponding rule is left out.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> (Self, Vec<MalformedRule>) {
        let mut rules = LineRules::default();
        let mut malformed = Vec::new();

        if let Some(raw) = properties.get(INCOMPATIBLE_PRODUCTS_KEY) {
            match parse_incompatible_products(raw) {
                Ok(ids) => rules.incompatible_with = ids,
                Err(e) => malformed.push(e),
            }
        }

        if let Some(raw) = properties.get(MAX_QUANTITY_KEY) {
            match parse_max_quantity(raw) {
                Ok(max) => rules.max_quantity = Some(max),
                Err(e) => malformed.push(e),
            }
        }

        (rules, malformed)
    }

    /// Numeric limit in force for this line, if any
    pub fn active_limit(&self) -> Option<u32> {
        self.max_quantity.and_then(MaxQuantity::limit)
    }

    /// Expand into individual constraints for `product_id`
    pub fn constraints(&self, product_id: ProductId) -> Vec<ConstraintRule> {
        let mut out: Vec<ConstraintRule> = self
            .incompatible_with
            .iter()
            .map(|&blocked| ConstraintRule::Incompatibility {
                product_id,
                blocked_product_id: blocked,
            })
            .collect();

        if let Some(limit) = self.active_limit() {
            out.push(ConstraintRule::MaxQuantity { product_id, limit });
        }

        out
    }

    pub fn is_empty(&self) -> bool {
        self.incompatible_with.is_empty() && self.max_quantity.is_none()
    }
}

/// Parse `"20, 31,"` into product IDs.
///
/// Blank segments are skipped. Any other non-integer segment rejects the
/// whole declaration.
pub fn parse_incompatible_products(raw: &str) -> Result<Vec<ProductId>, MalformedRule> {
    let mut ids = Vec::new();

    for segment in raw.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let id = segment.parse::<u64>().map_err(|_| {
            MalformedRule::new(
                INCOMPATIBLE_PRODUCTS_KEY,
                raw,
                format!("'{}' is not a product id", segment),
            )
        })?;

        if !ids.contains(&ProductId(id)) {
            ids.push(ProductId(id));
        }
    }

    Ok(ids)
}

/// Parse a max-quantity property value.
///
/// `"none"` (any case) means uncapped. Zero is rejected: a line cannot be
/// limited to nothing.
pub fn parse_max_quantity(raw: &str) -> Result<MaxQuantity, MalformedRule> {
    let value = raw.trim();

    if value.eq_ignore_ascii_case(UNLIMITED_SENTINEL) {
        return Ok(MaxQuantity::Unlimited);
    }

    match value.parse::<u32>() {
        Ok(0) => Err(MalformedRule::new(MAX_QUANTITY_KEY, raw, "limit must be positive")),
        Ok(n) => Ok(MaxQuantity::Limited(n)),
        Err(_) => Err(MalformedRule::new(MAX_QUANTITY_KEY, raw, "not a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_incompatible_list() {
        let ids = parse_incompatible_products("20, 31,,20").unwrap();
        assert_eq!(ids, vec![ProductId(20), ProductId(31)]);
    }

    #[test]
    fn test_parse_incompatible_rejects_garbage() {
        let err = parse_incompatible_products("20,abc").unwrap_err();
        assert_eq!(err.key, INCOMPATIBLE_PRODUCTS_KEY);
        assert!(err.reason.contains("abc"));
    }

    #[test]
    fn test_parse_max_quantity() {
        assert_eq!(parse_max_quantity("5"), Ok(MaxQuantity::Limited(5)));
        assert_eq!(parse_max_quantity(" 12 "), Ok(MaxQuantity::Limited(12)));
        assert_eq!(parse_max_quantity("none"), Ok(MaxQuantity::Unlimited));
        assert_eq!(parse_max_quantity("None"), Ok(MaxQuantity::Unlimited));
        assert!(parse_max_quantity("0").is_err());
        assert!(parse_max_quantity("five").is_err());
        assert!(parse_max_quantity("").is_err());
    }

    #[test]
    fn test_from_properties_drops_malformed() {
        let (rules, malformed) = LineRules::from_properties(&props(&[
            (INCOMPATIBLE_PRODUCTS_KEY, "x,y"),
            (MAX_QUANTITY_KEY, "3"),
        ]));

        assert!(rules.incompatible_with.is_empty());
        assert_eq!(rules.active_limit(), Some(3));
        assert_eq!(malformed.len(), 1);
    }

    #[test]
    fn test_from_properties_without_rules() {
        let (rules, malformed) = LineRules::from_properties(&props(&[("engraving", "Hi")]));
        assert!(rules.is_empty());
        assert!(malformed.is_empty());
    }

    #[test]
    fn test_constraints_expansion() {
        let rules = LineRules {
            incompatible_with: vec![ProductId(2)],
            max_quantity: Some(MaxQuantity::Limited(4)),
        };

        let constraints = rules.constraints(ProductId(1));
        assert_eq!(constraints.len(), 2);
        assert!(constraints.contains(&ConstraintRule::Incompatibility {
            product_id: ProductId(1),
            blocked_product_id: ProductId(2),
        }));
        assert!(constraints.contains(&ConstraintRule::MaxQuantity {
            product_id: ProductId(1),
            limit: 4,
        }));
    }

    #[test]
    fn test_unlimited_has_no_constraint() {
        let rules = LineRules {
            incompatible_with: vec![],
            max_quantity: Some(MaxQuantity::Unlimited),
        };
        assert!(rules.constraints(ProductId(9)).is_empty());
        assert_eq!(rules.active_limit(), None);
    }
}
