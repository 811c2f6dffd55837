//! Orders: backend service, wire types and the customer-side stores.

pub mod service;
pub mod session;
pub mod types;

pub use service::{HttpOrderService, OrderService};
pub use session::{CartStore, CustomerSession, InMemoryCart, InMemorySession};
pub use types::{
    BackendOrderStatus, CartItem, Coordinates, CreateOrderRequest, Customer, DeliveryAddress,
    OrderItemRequest, OrderRecord, OrderStatusRecord, OrderSummary,
};
