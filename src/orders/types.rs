use crate::payments::types::PaymentMethod;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub id: String,
    pub label: Option<String>,
    pub street: String,
    pub city: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl DeliveryAddress {
    pub fn full_address(&self) -> String {
        match self.city.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(city) => format!("{}, {}", self.street, city),
            None => self.street.clone(),
        }
    }
}

/// The signed-in customer as the app knows them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub menu_item_id: String,
    pub restaurant_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: BigDecimal,
    pub special_instructions: Option<String>,
}

impl CartItem {
    pub fn line_total(&self) -> BigDecimal {
        &self.unit_price * BigDecimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub menu_item_id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl From<&CartItem> for OrderItemRequest {
    fn from(item: &CartItem) -> Self {
        Self {
            menu_item_id: item.menu_item_id.clone(),
            quantity: item.quantity,
            special_instructions: item
                .special_instructions
                .clone()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub restaurant_id: String,
    pub items: Vec<OrderItemRequest>,
    pub delivery_address: String,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub payment_method: PaymentMethod,
}

/// Order as returned by the backend on creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(alias = "_id", alias = "orderId")]
    pub id: String,
    #[serde(default)]
    pub status: Option<BackendOrderStatus>,
    #[serde(default)]
    pub subtotal: Option<BigDecimal>,
    #[serde(alias = "deliveryFee", default)]
    pub delivery_price: Option<BigDecimal>,
    pub total: BigDecimal,
}

impl OrderRecord {
    pub fn summary(&self) -> OrderSummary {
        let delivery_fee = self
            .delivery_price
            .clone()
            .unwrap_or_else(|| BigDecimal::from(0));
        let subtotal = self
            .subtotal
            .clone()
            .unwrap_or_else(|| &self.total - &delivery_fee);
        OrderSummary {
            subtotal,
            delivery_fee,
            total: self.total.clone(),
        }
    }
}

/// Price snapshot kept on the flow once the order exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub subtotal: BigDecimal,
    pub delivery_fee: BigDecimal,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BackendOrderStatus {
    Pending,
    Confirmed,
    Preparing,
    ReadyForPickup,
    OutForDelivery,
    Delivered,
    Cancelled,
    PaymentPending,
    PaymentConfirmed,
    #[serde(other)]
    Unknown,
}

impl BackendOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendOrderStatus::Pending => "pending",
            BackendOrderStatus::Confirmed => "confirmed",
            BackendOrderStatus::Preparing => "preparing",
            BackendOrderStatus::ReadyForPickup => "ready_for_pickup",
            BackendOrderStatus::OutForDelivery => "out_for_delivery",
            BackendOrderStatus::Delivered => "delivered",
            BackendOrderStatus::Cancelled => "cancelled",
            BackendOrderStatus::PaymentPending => "payment_pending",
            BackendOrderStatus::PaymentConfirmed => "payment_confirmed",
            BackendOrderStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BackendOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an order status read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusRecord {
    pub status: BackendOrderStatus,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}
