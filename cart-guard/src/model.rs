//! Cart data model
//!
//! Two layers live here. [`CartPayload`] mirrors the JSON the cart service
//! speaks and is only ever (de)serialized. [`CartSnapshot`] is the typed view
//! the resolver works on: titles decoded, rule properties parsed into
//! [`LineRules`], positions made explicit.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rules::LineRules;

/// Shopify-style product identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Variant identifier, the key on-page product forms are matched by
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub u64);

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based cart line position.
///
/// Valid only for the snapshot it was read from: any mutation invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineIndex(pub usize);

impl LineIndex {
    /// Position of the `offset`-th (0-based) element
    pub fn from_offset(offset: usize) -> Self {
        Self(offset + 1)
    }

    /// 0-based offset into a line vector
    pub fn offset(self) -> usize {
        self.0.saturating_sub(1)
    }
}

impl fmt::Display for LineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

/// Cart as returned by the cart read endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartPayload {
    #[serde(default)]
    pub items: Vec<WireLineItem>,

    /// Passed through untouched
    #[serde(default)]
    pub cart_level_discount_applications: Vec<serde_json::Value>,
}

/// One line of the cart read payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLineItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub final_line_price: i64,

    #[serde(default)]
    pub requires_shipping: bool,

    /// Storefronts send `null` for lines without custom properties, and
    /// values are not always strings.
    #[serde(default)]
    pub properties: Option<BTreeMap<String, serde_json::Value>>,
}

impl WireLineItem {
    /// Build a bare line (no properties)
    pub fn new(product_id: u64, variant_id: u64, quantity: u32, title: &str) -> Self {
        Self {
            product_id: ProductId(product_id),
            variant_id: VariantId(variant_id),
            quantity,
            title: title.to_string(),
            final_line_price: 0,
            requires_shipping: true,
            properties: None,
        }
    }

    /// Attach a property
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self
    }
}

/// Body of a cart line write: quantity 0 removes the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    pub line: LineIndex,
    pub quantity: u32,
}

impl LineChange {
    pub fn remove(line: LineIndex) -> Self {
        Self { line, quantity: 0 }
    }

    pub fn set(line: LineIndex, quantity: u32) -> Self {
        Self { line, quantity }
    }

    pub fn is_removal(&self) -> bool {
        self.quantity == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only cart state for one reconciliation cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct CartSnapshot {
    pub lines: Vec<LineItem>,
    pub discount_applications: Vec<serde_json::Value>,
}

/// A cart line with its rules already parsed
#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub index: LineIndex,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
    /// Display title with HTML entities decoded
    pub title: String,
    pub final_line_price: i64,
    pub requires_shipping: bool,
    pub properties: BTreeMap<String, String>,
    pub rules: LineRules,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Line at a 1-based position
    pub fn line(&self, index: LineIndex) -> Option<&LineItem> {
        if index.0 == 0 {
            return None;
        }
        self.lines.get(index.offset())
    }

    /// Every line carrying `product_id`, in cart order
    pub fn lines_for_product(&self, product_id: ProductId) -> impl Iterator<Item = &LineItem> {
        self.lines.iter().filter(move |l| l.product_id == product_id)
    }

    /// First line carrying `product_id`
    pub fn find_product(&self, product_id: ProductId) -> Option<&LineItem> {
        self.lines_for_product(product_id).next()
    }

    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.find_product(product_id).is_some()
    }

    /// Total number of units across all lines
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}

/// Stringify a JSON property value the way a storefront renders it
pub(crate) fn property_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Decode the HTML entities storefront titles arrive with.
///
/// Handles the named entities themes actually emit plus decimal and hex
/// numeric references. Unknown entities are kept verbatim.
pub fn decode_html_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            decode_entity(entity).map(|c| (c, semi + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "eacute" => 'é',
        "egrave" => 'è',
        "ecirc" => 'ê',
        "agrave" => 'à',
        "ccedil" => 'ç',
        "ocirc" => 'ô',
        "rsquo" => '\u{2019}',
        "lsquo" => '\u{2018}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "reg" => '®',
        "trade" => '™',
        "copy" => '©',
        _ => return None,
    };
    Some(c)
}
