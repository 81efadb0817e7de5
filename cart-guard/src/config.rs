//! Configuration for Cart Guard

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, GuardResult};

/// Main guard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Cart endpoint configuration
    #[serde(default)]
    pub cart: CartEndpointConfig,

    /// Mutation dispatch configuration
    #[serde(default)]
    pub apply: ApplyConfig,

    /// User-facing texts
    #[serde(default)]
    pub messages: Messages,
}

impl GuardConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> GuardResult<Self> {
        let config: GuardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> GuardResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Check the values that serde cannot
    pub fn validate(&self) -> GuardResult<()> {
        for (name, path) in [
            ("cart_path", &self.cart.cart_path),
            ("change_path", &self.cart.change_path),
        ] {
            if !path.starts_with('/') {
                return Err(GuardError::Config(format!(
                    "{} must start with '/': {:?}",
                    name, path
                )));
            }
        }

        if self.cart.timeout_ms == Some(0) {
            return Err(GuardError::Config("timeout_ms must be positive".to_string()));
        }

        Ok(())
    }
}

/// Where the cart lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartEndpointConfig {
    /// Storefront origin, e.g. `https://shop.example.com`
    #[serde(default)]
    pub base_url: String,

    /// Cart read path
    #[serde(default = "default_cart_path")]
    pub cart_path: String,

    /// Line mutation path
    #[serde(default = "default_change_path")]
    pub change_path: String,

    /// Request timeout; none by default, a hang is the transport's concern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_cart_path() -> String { "/cart.js".to_string() }
fn default_change_path() -> String { "/cart/change.js".to_string() }

impl Default for CartEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            cart_path: default_cart_path(),
            change_path: default_change_path(),
            timeout_ms: None,
        }
    }
}

/// Mutation dispatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// How quantity clamps are sent
    #[serde(default)]
    pub clamp_dispatch: ClampDispatch,
}

/// Clamp dispatch policy. Removals are always sequential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClampDispatch {
    /// Fire every clamp at once and join
    #[default]
    Concurrent,
    /// One clamp at a time
    Sequential,
}

/// Notice templates and button labels.
///
/// Templates substitute `{product}`, `{other}` and `{limit}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default = "default_incompatible")]
    pub incompatible: String,

    #[serde(default = "default_quantity_clamped")]
    pub quantity_clamped: String,

    #[serde(default = "default_add_to_cart")]
    pub add_to_cart_label: String,

    #[serde(default = "default_limit_reached")]
    pub limit_reached_label: String,
}

fn default_incompatible() -> String {
    "Le produit \"{product}\" est incompatible avec \"{other}\". Le produit incompatible sera supprimé.".to_string()
}

fn default_quantity_clamped() -> String {
    "La quantité maximale pour le produit \"{product}\" est {limit}. Le produit sera ajusté à cette limite.".to_string()
}

fn default_add_to_cart() -> String { "Ajouter au panier".to_string() }
fn default_limit_reached() -> String { "Quantité maximale atteinte".to_string() }

impl Default for Messages {
    fn default() -> Self {
        Self {
            incompatible: default_incompatible(),
            quantity_clamped: default_quantity_clamped(),
            add_to_cart_label: default_add_to_cart(),
            limit_reached_label: default_limit_reached(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = GuardConfig::from_json("{}").unwrap();
        assert_eq!(config.cart.cart_path, "/cart.js");
        assert_eq!(config.cart.change_path, "/cart/change.js");
        assert_eq!(config.cart.timeout_ms, None);
        assert_eq!(config.apply.clamp_dispatch, ClampDispatch::Concurrent);
        assert_eq!(config.messages.add_to_cart_label, "Ajouter au panier");
    }

    #[test]
    fn test_partial_document() {
        let config = GuardConfig::from_json(
            r#"{
                "cart": {"base_url": "https://shop.test", "timeout_ms": 2000},
                "apply": {"clamp_dispatch": "sequential"},
                "messages": {"limit_reached_label": "Limit reached"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.cart.base_url, "https://shop.test");
        assert_eq!(config.cart.timeout_ms, Some(2000));
        assert_eq!(config.apply.clamp_dispatch, ClampDispatch::Sequential);
        assert_eq!(config.messages.limit_reached_label, "Limit reached");
        assert_eq!(config.messages.add_to_cart_label, "Ajouter au panier");
    }

    #[test]
    fn test_rejects_relative_paths() {
        let err = GuardConfig::from_json(r#"{"cart": {"cart_path": "cart.js"}}"#).unwrap_err();
        assert!(matches!(err, GuardError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(GuardConfig::from_json(r#"{"cart": {"timeout_ms": 0}}"#).is_err());
    }
}
