//! HTTP transport to a storefront cart

use std::time::Duration;

use async_trait::async_trait;

use crate::client::CartService;
use crate::config::CartEndpointConfig;
use crate::error::{GuardError, GuardResult, TransportError, TransportResult};
use crate::model::{CartPayload, LineChange};

/// Cart service backed by the storefront's AJAX cart endpoints
pub struct RestCartService {
    http_client: reqwest::Client,
    cart_url: String,
    change_url: String,
}

impl RestCartService {
    /// Build the client from endpoint configuration
    pub fn new(config: &CartEndpointConfig) -> GuardResult<Self> {
        if config.base_url.is_empty() {
            return Err(GuardError::Config("cart.base_url is required".to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http_client = builder.build().map_err(TransportError::from)?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            http_client,
            cart_url: format!("{}{}", base, config.cart_path),
            change_url: format!("{}{}", base, config.change_path),
        })
    }

    pub fn cart_url(&self) -> &str {
        &self.cart_url
    }

    pub fn change_url(&self) -> &str {
        &self.change_url
    }
}

async fn check_status(response: reqwest::Response) -> TransportResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CartService for RestCartService {
    async fn fetch_cart(&self) -> TransportResult<CartPayload> {
        let response = self.http_client.get(&self.cart_url).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn change_line(&self, change: LineChange) -> TransportResult<()> {
        tracing::debug!(line = %change.line, quantity = change.quantity, "POST cart change");

        let response = self
            .http_client
            .post(&self.change_url)
            .json(&change)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_joined() {
        let config = CartEndpointConfig {
            base_url: "https://shop.test/".to_string(),
            ..CartEndpointConfig::default()
        };
        let service = RestCartService::new(&config).unwrap();

        assert_eq!(service.cart_url(), "https://shop.test/cart.js");
        assert_eq!(service.change_url(), "https://shop.test/cart/change.js");
    }

    #[test]
    fn test_base_url_required() {
        assert!(RestCartService::new(&CartEndpointConfig::default()).is_err());
    }
}
