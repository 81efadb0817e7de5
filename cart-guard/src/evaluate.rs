//! Rule evaluation
//!
//! [`evaluate`] is a pure function of the snapshot and the trigger: it reads
//! every line's rules, finds the incompatible products that actually share
//! the cart and the lines above their quantity ceiling, and decides which
//! lines have to go.
//!
//! Incompatible pairs are unordered. `{A, B}` and `{B, A}` collapse to one
//! key, so two products declaring each other produce a single conflict and a
//! single removal.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{CartSnapshot, LineIndex, LineItem, ProductId, VariantId};

/// Canonical unordered product pair (`low < high`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncompatiblePair {
    pub low: ProductId,
    pub high: ProductId,
}

impl IncompatiblePair {
    pub fn new(a: ProductId, b: ProductId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.low == product_id || self.high == product_id
    }

    /// The other side of the pair
    pub fn other(&self, product_id: ProductId) -> ProductId {
        if self.low == product_id {
            self.high
        } else {
            self.low
        }
    }
}

/// Two incompatible products found together, and which one loses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub pair: IncompatiblePair,

    /// Product whose lines are removed
    pub removed_product: ProductId,

    /// Title of the removed product
    pub removed_title: String,

    /// Title of the product that stays
    pub kept_title: String,

    /// Lines scheduled for removal because of this conflict
    pub removed_lines: Vec<LineIndex>,
}

/// A line above its declared ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clamp {
    pub line: LineIndex,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub title: String,
    pub quantity: u32,
    pub limit: u32,
}

/// Everything wrong with a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReport {
    /// Every incompatible pair present together, in detection order
    pub pairs: Vec<IncompatiblePair>,

    /// Pairs that caused a removal. A pair whose loser was already taken out
    /// by an earlier conflict is in `pairs` but not here.
    pub conflicts: Vec<Conflict>,

    /// Lines to remove
    pub removals: BTreeSet<LineIndex>,

    /// Lines to clamp, never overlapping `removals`
    pub clamps: BTreeMap<LineIndex, Clamp>,
}

impl ViolationReport {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.clamps.is_empty()
    }
}

/// Evaluate a snapshot against the rules its lines declare.
///
/// `trigger` is the product whose addition raised the event. When it is one
/// side of a conflict it loses; otherwise the product owning the later line
/// loses.
pub fn evaluate(snapshot: &CartSnapshot, trigger: Option<ProductId>) -> ViolationReport {
    let mut report = ViolationReport::default();
    let mut seen: HashSet<IncompatiblePair> = HashSet::new();

    for line in &snapshot.lines {
        for &blocked in &line.rules.incompatible_with {
            if blocked == line.product_id {
                continue;
            }

            let pair = IncompatiblePair::new(line.product_id, blocked);
            if !seen.insert(pair) {
                continue;
            }

            if !snapshot.contains_product(blocked) {
                continue;
            }
            report.pairs.push(pair);

            // An earlier conflict may already have taken one side out
            let gone = |p: ProductId| {
                snapshot
                    .lines_for_product(p)
                    .all(|l| report.removals.contains(&l.index))
            };
            if gone(pair.low) || gone(pair.high) {
                continue;
            }

            let loser = losing_product(snapshot, pair, trigger);
            let winner = pair.other(loser);

            let removed_lines: Vec<LineIndex> =
                snapshot.lines_for_product(loser).map(|l| l.index).collect();

            tracing::debug!(
                low = %pair.low,
                high = %pair.high,
                removed_product = %loser,
                lines = removed_lines.len(),
                "Incompatible products in cart"
            );

            report.removals.extend(removed_lines.iter().copied());
            report.conflicts.push(Conflict {
                pair,
                removed_product: loser,
                removed_title: title_of(snapshot, loser),
                kept_title: title_of(snapshot, winner),
                removed_lines,
            });
        }
    }

    for line in &snapshot.lines {
        if report.removals.contains(&line.index) {
            continue;
        }
        if let Some(clamp) = clamp_for(line) {
            report.clamps.insert(line.index, clamp);
        }
    }

    report
}

fn losing_product(snapshot: &CartSnapshot, pair: IncompatiblePair, trigger: Option<ProductId>) -> ProductId {
    if let Some(trigger) = trigger.filter(|t| pair.contains(*t)) {
        return trigger;
    }

    // Last-added loses: the product owning the highest position
    snapshot
        .lines
        .iter()
        .rev()
        .find(|l| pair.contains(l.product_id))
        .map(|l| l.product_id)
        .unwrap_or(pair.high)
}

fn title_of(snapshot: &CartSnapshot, product_id: ProductId) -> String {
    snapshot
        .find_product(product_id)
        .map(|l| l.title.clone())
        .unwrap_or_default()
}

fn clamp_for(line: &LineItem) -> Option<Clamp> {
    let limit = line.rules.active_limit()?;
    if line.quantity <= limit {
        return None;
    }

    Some(Clamp {
        line: line.index,
        product_id: line.product_id,
        variant_id: line.variant_id,
        title: line.title.clone(),
        quantity: line.quantity,
        limit,
    })
}
