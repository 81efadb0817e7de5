//! Cart service interface
//!
//! The guard never talks to a network directly. Everything goes through
//! [`CartService`], which supports exactly two operations: read the whole
//! cart, and change one line.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{TransportError, TransportResult};
use crate::model::{CartPayload, LineChange, WireLineItem};

/// Cart service interface
#[async_trait]
pub trait CartService: Send + Sync {
    /// Read the current cart
    async fn fetch_cart(&self) -> TransportResult<CartPayload>;

    /// Change the quantity of one line (0 removes it)
    async fn change_line(&self, change: LineChange) -> TransportResult<()>;
}

#[async_trait]
impl<S: CartService + ?Sized> CartService for Arc<S> {
    async fn fetch_cart(&self) -> TransportResult<CartPayload> {
        (**self).fetch_cart().await
    }

    async fn change_line(&self, change: LineChange) -> TransportResult<()> {
        (**self).change_line(change).await
    }
}

/// In-process cart (simulation and tests)
///
/// Applies the same line semantics as a storefront: positions are 1-based,
/// and removing a line shifts every later line up by one.
#[derive(Debug, Default)]
pub struct MemoryCartService {
    cart: Mutex<CartPayload>,
    writes: Mutex<Vec<LineChange>>,
}

impl MemoryCartService {
    pub fn new(items: Vec<WireLineItem>) -> Self {
        Self::from_payload(CartPayload {
            items,
            cart_level_discount_applications: Vec::new(),
        })
    }

    pub fn from_payload(payload: CartPayload) -> Self {
        Self {
            cart: Mutex::new(payload),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Current cart contents
    pub async fn items(&self) -> Vec<WireLineItem> {
        self.cart.lock().await.items.clone()
    }

    /// Replace the cart contents (simulates another tab or an add-to-cart)
    pub async fn set_items(&self, items: Vec<WireLineItem>) {
        self.cart.lock().await.items = items;
    }

    /// Append a line, as an add-to-cart would
    pub async fn push_item(&self, item: WireLineItem) {
        self.cart.lock().await.items.push(item);
    }

    /// Every successful write, in the order it was applied
    pub async fn writes(&self) -> Vec<LineChange> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl CartService for MemoryCartService {
    async fn fetch_cart(&self) -> TransportResult<CartPayload> {
        Ok(self.cart.lock().await.clone())
    }

    async fn change_line(&self, change: LineChange) -> TransportResult<()> {
        let mut cart = self.cart.lock().await;
        let len = cart.items.len();

        if change.line.0 == 0 || change.line.0 > len {
            return Err(TransportError::LineOutOfRange {
                line: change.line,
                len,
            });
        }

        let offset = change.line.offset();
        if change.is_removal() {
            cart.items.remove(offset);
        } else {
            cart.items[offset].quantity = change.quantity;
        }
        drop(cart);

        self.writes.lock().await.push(change);
        Ok(())
    }
}
