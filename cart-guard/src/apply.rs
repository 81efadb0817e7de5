//! Mutation application
//!
//! Sends a [`Plan`] to the cart service. Application is best-effort: a
//! failed write is logged and recorded, and the rest of the plan still goes
//! out.
//!
//! Plan positions refer to the evaluated snapshot. Removals are sent highest
//! first so each one still points at the right line. Clamps go after all
//! removals, so their position is shifted down by the number of lines that
//! were actually removed in front of them.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::client::CartService;
use crate::config::ClampDispatch;
use crate::error::{GuardError, GuardResult};
use crate::model::{LineChange, LineIndex};
use crate::plan::{Plan, ReconciliationAction};

/// A write that did not land
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMutation {
    pub action: ReconciliationAction,
    pub change: LineChange,
    pub error: String,
}

/// Outcome of applying a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Writes that succeeded, in completion order per phase
    pub applied: Vec<LineChange>,

    /// Writes that failed
    pub failed: Vec<FailedMutation>,

    /// Number of clamp writes sent (successful or not)
    pub clamps_attempted: usize,
}

impl ApplyReport {
    /// Number of writes that succeeded
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Whether every write landed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether any write actually changed the cart
    pub fn changed_cart(&self) -> bool {
        !self.applied.is_empty()
    }

    /// Collapse into the number of applied writes, or a partial-apply error
    pub fn into_result(self) -> GuardResult<usize> {
        if self.failed.is_empty() {
            Ok(self.applied.len())
        } else {
            Err(GuardError::PartialApply {
                applied: self.applied.len(),
                failed: self.failed.len(),
            })
        }
    }

    fn record(&mut self, action: ReconciliationAction, change: LineChange, result: Result<(), String>) {
        match result {
            Ok(()) => {
                tracing::info!(
                    line = %change.line,
                    quantity = change.quantity,
                    "Applied cart correction"
                );
                self.applied.push(change);
            }
            Err(error) => {
                tracing::warn!(
                    line = %change.line,
                    quantity = change.quantity,
                    error = %error,
                    "Cart correction failed"
                );
                self.failed.push(FailedMutation { action, change, error });
            }
        }
    }
}

/// Apply a plan against the cart service
pub async fn apply<S: CartService + ?Sized>(
    service: &S,
    plan: &Plan,
    dispatch: ClampDispatch,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    let mut removed: Vec<LineIndex> = Vec::new();

    for action in plan.removals() {
        let change = action.to_change(action.line());
        let result = service.change_line(change).await.map_err(|e| e.to_string());
        if result.is_ok() {
            removed.push(action.line());
        }
        report.record(*action, change, result);
    }

    let clamps: Vec<(ReconciliationAction, LineChange)> = plan
        .clamps()
        .map(|action| {
            let line = action.line();
            let shift = removed.iter().filter(|r| **r < line).count();
            (*action, action.to_change(LineIndex(line.0 - shift)))
        })
        .collect();

    report.clamps_attempted = clamps.len();

    let results: Vec<Result<(), String>> = match dispatch {
        ClampDispatch::Concurrent => {
            join_all(clamps.iter().map(|(_, change)| service.change_line(*change)))
                .await
                .into_iter()
                .map(|r| r.map_err(|e| e.to_string()))
                .collect()
        }
        ClampDispatch::Sequential => {
            let mut results = Vec::with_capacity(clamps.len());
            for (_, change) in &clamps {
                results.push(service.change_line(*change).await.map_err(|e| e.to_string()));
            }
            results
        }
    };

    for ((action, change), result) in clamps.into_iter().zip(results) {
        report.record(action, change, result);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryCartService;
    use crate::model::WireLineItem;

    fn cart(n: u64) -> MemoryCartService {
        MemoryCartService::new((1..=n).map(|p| WireLineItem::new(p, p * 10, 3, "x")).collect())
    }

    #[tokio::test]
    async fn test_empty_plan_is_noop() {
        let service = cart(2);
        let report = apply(&service, &Plan::default(), ClampDispatch::Concurrent).await;

        assert_eq!(report, ApplyReport::default());
        assert!(service.writes().await.is_empty());
        assert_eq!(report.into_result().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clamp_position_shifts_after_removal() {
        let service = cart(4);

        let mut report = crate::evaluate::ViolationReport::default();
        report.removals.insert(LineIndex(2));
        report.clamps.insert(
            LineIndex(3),
            crate::evaluate::Clamp {
                line: LineIndex(3),
                product_id: crate::model::ProductId(3),
                variant_id: crate::model::VariantId(30),
                title: String::new(),
                quantity: 3,
                limit: 1,
            },
        );
        let plan = crate::plan::plan(&report);

        let applied = apply(&service, &plan, ClampDispatch::Sequential).await;

        assert!(applied.is_complete());
        assert_eq!(
            service.writes().await,
            vec![LineChange::remove(LineIndex(2)), LineChange::set(LineIndex(2), 1)]
        );

        let items = service.items().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].product_id.0, 3);
        assert_eq!(items[1].quantity, 1);
    }
}
