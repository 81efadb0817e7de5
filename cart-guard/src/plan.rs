//! Reconciliation planning
//!
//! Turns a [`ViolationReport`] into the ordered list of cart writes that
//! fixes it. Removals come first, highest position first: removing a line
//! shifts every later line up, so going from the end keeps the remaining
//! snapshot positions correct.

use serde::{Deserialize, Serialize};

use crate::evaluate::ViolationReport;
use crate::model::{LineChange, LineIndex};

/// One corrective cart write, indexed against the evaluated snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationAction {
    RemoveLine { line: LineIndex },
    SetQuantity { line: LineIndex, quantity: u32 },
}

impl ReconciliationAction {
    /// Position in the evaluated snapshot
    pub fn line(&self) -> LineIndex {
        match *self {
            ReconciliationAction::RemoveLine { line } => line,
            ReconciliationAction::SetQuantity { line, .. } => line,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, ReconciliationAction::RemoveLine { .. })
    }

    /// Cart write for this action, targeting `position`
    pub fn to_change(&self, position: LineIndex) -> LineChange {
        match *self {
            ReconciliationAction::RemoveLine { .. } => LineChange::remove(position),
            ReconciliationAction::SetQuantity { quantity, .. } => LineChange::set(position, quantity),
        }
    }
}

/// Ordered corrective actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    actions: Vec<ReconciliationAction>,
}

impl Plan {
    pub fn actions(&self) -> &[ReconciliationAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Removals, highest position first
    pub fn removals(&self) -> impl Iterator<Item = &ReconciliationAction> {
        self.actions.iter().filter(|a| a.is_removal())
    }

    /// Clamps, ascending position
    pub fn clamps(&self) -> impl Iterator<Item = &ReconciliationAction> {
        self.actions.iter().filter(|a| !a.is_removal())
    }

    pub fn has_clamps(&self) -> bool {
        self.clamps().next().is_some()
    }
}

/// Build the plan for a report
pub fn plan(report: &ViolationReport) -> Plan {
    let mut actions: Vec<ReconciliationAction> = report
        .removals
        .iter()
        .rev()
        .map(|&line| ReconciliationAction::RemoveLine { line })
        .collect();

    actions.extend(
        report
            .clamps
            .iter()
            .filter(|(line, _)| !report.removals.contains(*line))
            .map(|(&line, clamp)| ReconciliationAction::SetQuantity {
                line,
                quantity: clamp.limit,
            }),
    );

    Plan { actions }
}
