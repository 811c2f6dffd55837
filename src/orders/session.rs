//! Customer-side stores the order flow reads from: who is signed in, where
//! to deliver, and what is in the cart.

use crate::orders::types::{CartItem, Customer, DeliveryAddress};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait CustomerSession: Send + Sync {
    async fn current_user(&self) -> Option<Customer>;

    async fn default_address(&self) -> Option<DeliveryAddress>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn items(&self) -> Vec<CartItem>;

    async fn clear(&self);

    /// Items belonging to one restaurant.
    async fn items_for_restaurant(&self, restaurant_id: &str) -> Vec<CartItem> {
        self.items()
            .await
            .into_iter()
            .filter(|item| item.restaurant_id == restaurant_id)
            .collect()
    }

    async fn subtotal(&self) -> BigDecimal {
        self.items()
            .await
            .iter()
            .fold(BigDecimal::from(0), |acc, item| acc + item.line_total())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<Customer>,
    default_address: Option<DeliveryAddress>,
}

/// Session kept in memory; what a device would hold after sign-in.
#[derive(Debug, Clone, Default)]
pub struct InMemorySession {
    state: Arc<RwLock<SessionState>>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sign_in(&self, user: Customer) {
        self.state.write().await.user = Some(user);
    }

    pub async fn sign_out(&self) {
        let mut state = self.state.write().await;
        state.user = None;
        state.default_address = None;
    }

    pub async fn set_default_address(&self, address: Option<DeliveryAddress>) {
        self.state.write().await.default_address = address;
    }
}

#[async_trait]
impl CustomerSession for InMemorySession {
    async fn current_user(&self) -> Option<Customer> {
        self.state.read().await.user.clone()
    }

    async fn default_address(&self) -> Option<DeliveryAddress> {
        self.state.read().await.default_address.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCart {
    items: Arc<RwLock<Vec<CartItem>>>,
}

impl InMemoryCart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item, merging quantities with an existing line for the same
    /// menu item.
    pub async fn add_item(&self, item: CartItem) {
        let mut items = self.items.write().await;
        match items
            .iter_mut()
            .find(|existing| existing.menu_item_id == item.menu_item_id)
        {
            Some(existing) => existing.quantity += item.quantity,
            None => items.push(item),
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl CartStore for InMemoryCart {
    async fn items(&self) -> Vec<CartItem> {
        self.items.read().await.clone()
    }

    async fn clear(&self) {
        self.items.write().await.clear();
    }
}
