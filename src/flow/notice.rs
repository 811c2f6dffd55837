use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// User-visible events raised by the order flow (toasts, alerts).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowNotice {
    OrderPlaced { order_id: String },
    RestaurantConfirmed { order_id: String, total: BigDecimal },
    RestaurantTimeout { order_id: String },
    OrderCancelled { order_id: Option<String>, reason: String },
    OrderFailed { message: String },
    PaymentSucceeded { order_id: String, transaction_id: String },
    PaymentFailed { order_id: String, message: String },
    OrderPreparing { order_id: String },
    OrderReady { order_id: String },
    OutForDelivery { order_id: String },
    OrderDelivered { order_id: String },
    SessionExpired,
}

impl FlowNotice {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            FlowNotice::RestaurantTimeout { .. }
                | FlowNotice::OrderCancelled { .. }
                | FlowNotice::OrderFailed { .. }
                | FlowNotice::PaymentFailed { .. }
                | FlowNotice::SessionExpired
        )
    }

    pub fn message(&self) -> String {
        match self {
            FlowNotice::OrderPlaced { .. } => {
                "Order placed. Waiting for the restaurant to confirm".to_string()
            }
            FlowNotice::RestaurantConfirmed { total, .. } => {
                format!("Restaurant confirmed your order. Amount due: {}", total)
            }
            FlowNotice::RestaurantTimeout { .. } => {
                "The restaurant did not respond in time. Your order was cancelled".to_string()
            }
            FlowNotice::OrderCancelled { reason, .. } => reason.clone(),
            FlowNotice::OrderFailed { message } => message.clone(),
            FlowNotice::PaymentSucceeded { .. } => "Payment successful".to_string(),
            FlowNotice::PaymentFailed { message, .. } => message.clone(),
            FlowNotice::OrderPreparing { .. } => "Your order is being prepared".to_string(),
            FlowNotice::OrderReady { .. } => "Your order is ready".to_string(),
            FlowNotice::OutForDelivery { .. } => "Your order is on its way".to_string(),
            FlowNotice::OrderDelivered { .. } => "Your order has been delivered".to_string(),
            FlowNotice::SessionExpired => {
                "Your session has expired. Please sign in again".to_string()
            }
        }
    }
}

/// Where flow notices go. Implementations must not block.
pub trait FlowNotifier: Send + Sync {
    fn notify(&self, notice: FlowNotice);
}

/// Writes every notice to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl FlowNotifier for LogNotifier {
    fn notify(&self, notice: FlowNotice) {
        if notice.is_error() {
            warn!(notice = ?notice, "NOTIFICATION: {}", notice.message());
        } else {
            info!(notice = ?notice, "NOTIFICATION: {}", notice.message());
        }
    }
}
