//! Page hooks: how the guard reaches the user and the view layer

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Messages;
use crate::evaluate::ViolationReport;
use crate::sync::{ProductForm, UiDirective};

/// Something the user must be told before the cart is corrected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// `product` is being removed because it conflicts with `other`
    Incompatible { product: String, other: String },

    /// `product` is being brought down to `limit`
    QuantityClamped { product: String, limit: u32 },
}

impl Notice {
    /// One notice per conflict, then one per clamp
    pub fn from_report(report: &ViolationReport) -> Vec<Notice> {
        let conflicts = report.conflicts.iter().map(|c| Notice::Incompatible {
            product: c.removed_title.clone(),
            other: c.kept_title.clone(),
        });

        let clamps = report.clamps.values().map(|c| Notice::QuantityClamped {
            product: c.title.clone(),
            limit: c.limit,
        });

        conflicts.chain(clamps).collect()
    }

    /// Render with the configured templates
    pub fn render(&self, messages: &Messages) -> String {
        match self {
            Notice::Incompatible { product, other } => messages
                .incompatible
                .replace("{product}", product)
                .replace("{other}", other),
            Notice::QuantityClamped { product, limit } => messages
                .quantity_clamped
                .replace("{product}", product)
                .replace("{limit}", &limit.to_string()),
        }
    }
}

/// Page-side collaborator of the guard.
///
/// `notify` is blocking by contract: it returns once the user has
/// acknowledged, and the cart is not touched before that.
pub trait GuardHooks: Send + Sync {
    /// Tell the user about a correction
    fn notify(&self, notice: &Notice, text: &str);

    /// Product forms currently on the page; empty when not on a product page
    fn page_forms(&self) -> Vec<ProductForm> {
        Vec::new()
    }

    /// Apply UI directives computed from the fresh cart
    fn apply_directives(&self, _directives: &[UiDirective]) {}

    /// The cart was corrected; dependents should re-render
    fn on_cart_refreshed(&self) {}
}

impl<H: GuardHooks + ?Sized> GuardHooks for Arc<H> {
    fn notify(&self, notice: &Notice, text: &str) {
        (**self).notify(notice, text)
    }

    fn page_forms(&self) -> Vec<ProductForm> {
        (**self).page_forms()
    }

    fn apply_directives(&self, directives: &[UiDirective]) {
        (**self).apply_directives(directives)
    }

    fn on_cart_refreshed(&self) {
        (**self).on_cart_refreshed()
    }
}

/// Default no-op hook implementation
pub struct NoOpHooks;

impl GuardHooks for NoOpHooks {
    fn notify(&self, _notice: &Notice, _text: &str) {
        // No-op
    }
}

/// Hooks that only log, for headless runs
#[derive(Debug, Default)]
pub struct LogHooks {
    forms: Vec<ProductForm>,
}

impl LogHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend these forms are on the page
    pub fn with_forms(forms: Vec<ProductForm>) -> Self {
        Self { forms }
    }
}

impl GuardHooks for LogHooks {
    fn notify(&self, _notice: &Notice, text: &str) {
        tracing::info!(notice = %text, "User notice");
    }

    fn page_forms(&self) -> Vec<ProductForm> {
        self.forms.clone()
    }

    fn apply_directives(&self, directives: &[UiDirective]) {
        for directive in directives {
            tracing::info!(variant_id = %directive.variant_id(), ?directive, "UI directive");
        }
    }

    fn on_cart_refreshed(&self) {
        tracing::info!("Cart refreshed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_incompatible() {
        let notice = Notice::Incompatible {
            product: "Shampooing".to_string(),
            other: "Après-shampooing".to_string(),
        };

        assert_eq!(
            notice.render(&Messages::default()),
            "Le produit \"Shampooing\" est incompatible avec \"Après-shampooing\". Le produit incompatible sera supprimé."
        );
    }

    #[test]
    fn test_render_clamped_with_custom_template() {
        let messages = Messages {
            quantity_clamped: "{product} capped at {limit}".to_string(),
            ..Messages::default()
        };
        let notice = Notice::QuantityClamped {
            product: "Gloves".to_string(),
            limit: 5,
        };

        assert_eq!(notice.render(&messages), "Gloves capped at 5");
    }
}
