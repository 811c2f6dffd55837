//! Order flow state machine.
//!
//! ```text
//! Idle ─► CreatingOrder ─┬─► WaitingRestaurant ─┬─► PaymentRequired ─► PaymentProcessing ─► PaymentPolling ─┬─► PaymentSuccess ─► OrderPreparing ─► OrderReady ─► OrderDelivering ─► OrderCompleted
//!                        │                      ├─► OrderCancelled                    ▲                   └─► PaymentFailed
//!                        └─► OrderFailed        └─► (timeout) OrderCancelled          └──── retry ───────────────────┘
//! ```
//!
//! Each variant of [`FlowState`] carries only the data valid in that step.
//! [`FlowMachine`] wraps the state with two counters: `session` changes when a
//! new order is started, `generation` changes on every step change. Async
//! work captures the counters when it starts and its result is dropped if
//! they moved in the meantime.

use crate::flow::error::{FlowError, FlowResult};
use crate::flow::notice::FlowNotice;
use crate::orders::types::{BackendOrderStatus, OrderRecord, OrderStatusRecord, OrderSummary};
use crate::payments::types::{PaymentPollingResult, PollStatus};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const RESTAURANT_TIMEOUT_REASON: &str = "Restaurant did not respond in time";
pub const RESTAURANT_CANCELLED_REASON: &str = "Order was cancelled by the restaurant";
pub const CUSTOMER_CANCELLED_REASON: &str = "Order cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    #[default]
    Idle,
    CreatingOrder,
    WaitingRestaurant,
    PaymentRequired,
    PaymentProcessing,
    PaymentPolling,
    PaymentSuccess,
    PaymentFailed,
    OrderPreparing,
    OrderReady,
    OrderDelivering,
    OrderCompleted,
    OrderCancelled,
    OrderFailed,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStep::Idle => "idle",
            FlowStep::CreatingOrder => "creating_order",
            FlowStep::WaitingRestaurant => "waiting_restaurant",
            FlowStep::PaymentRequired => "payment_required",
            FlowStep::PaymentProcessing => "payment_processing",
            FlowStep::PaymentPolling => "payment_polling",
            FlowStep::PaymentSuccess => "payment_success",
            FlowStep::PaymentFailed => "payment_failed",
            FlowStep::OrderPreparing => "order_preparing",
            FlowStep::OrderReady => "order_ready",
            FlowStep::OrderDelivering => "order_delivering",
            FlowStep::OrderCompleted => "order_completed",
            FlowStep::OrderCancelled => "order_cancelled",
            FlowStep::OrderFailed => "order_failed",
        }
    }

    /// No automatic transition leaves a terminal step.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStep::OrderCompleted | FlowStep::OrderCancelled | FlowStep::OrderFailed
        )
    }

    /// Steps during which the backend order status is polled.
    pub fn polls_order_status(&self) -> bool {
        matches!(
            self,
            FlowStep::WaitingRestaurant
                | FlowStep::OrderPreparing
                | FlowStep::OrderReady
                | FlowStep::OrderDelivering
        )
    }

    /// Position along the happy path; `None` for the failure branches.
    fn progress(&self) -> Option<u8> {
        match self {
            FlowStep::Idle => Some(0),
            FlowStep::CreatingOrder => Some(1),
            FlowStep::WaitingRestaurant => Some(2),
            FlowStep::PaymentRequired => Some(3),
            FlowStep::PaymentProcessing => Some(4),
            FlowStep::PaymentPolling => Some(5),
            FlowStep::PaymentSuccess | FlowStep::PaymentFailed => Some(6),
            FlowStep::OrderPreparing => Some(7),
            FlowStep::OrderReady => Some(8),
            FlowStep::OrderDelivering => Some(9),
            FlowStep::OrderCompleted => Some(10),
            FlowStep::OrderCancelled | FlowStep::OrderFailed => None,
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order the backend has accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: String,
    pub summary: OrderSummary,
}

impl PlacedOrder {
    pub fn from_record(record: &OrderRecord) -> Self {
        Self {
            order_id: record.id.clone(),
            summary: record.summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    CreatingOrder {
        restaurant_id: String,
    },
    WaitingRestaurant {
        order: PlacedOrder,
        time_remaining: u32,
    },
    PaymentRequired {
        order: PlacedOrder,
    },
    PaymentProcessing {
        order: PlacedOrder,
        time_remaining: u32,
    },
    PaymentPolling {
        order: PlacedOrder,
        transaction_id: Option<String>,
        time_remaining: u32,
    },
    PaymentSuccess {
        order: PlacedOrder,
        transaction_id: String,
    },
    PaymentFailed {
        order: PlacedOrder,
        transaction_id: Option<String>,
        error: String,
    },
    OrderPreparing {
        order: PlacedOrder,
    },
    OrderReady {
        order: PlacedOrder,
    },
    OrderDelivering {
        order: PlacedOrder,
    },
    OrderCompleted {
        order: PlacedOrder,
    },
    OrderCancelled {
        order: Option<PlacedOrder>,
        reason: String,
    },
    OrderFailed {
        error: String,
    },
}

impl FlowState {
    pub fn step(&self) -> FlowStep {
        match self {
            FlowState::Idle => FlowStep::Idle,
            FlowState::CreatingOrder { .. } => FlowStep::CreatingOrder,
            FlowState::WaitingRestaurant { .. } => FlowStep::WaitingRestaurant,
            FlowState::PaymentRequired { .. } => FlowStep::PaymentRequired,
            FlowState::PaymentProcessing { .. } => FlowStep::PaymentProcessing,
            FlowState::PaymentPolling { .. } => FlowStep::PaymentPolling,
            FlowState::PaymentSuccess { .. } => FlowStep::PaymentSuccess,
            FlowState::PaymentFailed { .. } => FlowStep::PaymentFailed,
            FlowState::OrderPreparing { .. } => FlowStep::OrderPreparing,
            FlowState::OrderReady { .. } => FlowStep::OrderReady,
            FlowState::OrderDelivering { .. } => FlowStep::OrderDelivering,
            FlowState::OrderCompleted { .. } => FlowStep::OrderCompleted,
            FlowState::OrderCancelled { .. } => FlowStep::OrderCancelled,
            FlowState::OrderFailed { .. } => FlowStep::OrderFailed,
        }
    }

    pub fn order(&self) -> Option<&PlacedOrder> {
        match self {
            FlowState::WaitingRestaurant { order, .. }
            | FlowState::PaymentRequired { order }
            | FlowState::PaymentProcessing { order, .. }
            | FlowState::PaymentPolling { order, .. }
            | FlowState::PaymentSuccess { order, .. }
            | FlowState::PaymentFailed { order, .. }
            | FlowState::OrderPreparing { order }
            | FlowState::OrderReady { order }
            | FlowState::OrderDelivering { order }
            | FlowState::OrderCompleted { order } => Some(order),
            FlowState::OrderCancelled { order, .. } => order.as_ref(),
            FlowState::Idle | FlowState::CreatingOrder { .. } | FlowState::OrderFailed { .. } => {
                None
            }
        }
    }

    pub fn time_remaining(&self) -> Option<u32> {
        match self {
            FlowState::WaitingRestaurant { time_remaining, .. }
            | FlowState::PaymentProcessing { time_remaining, .. }
            | FlowState::PaymentPolling { time_remaining, .. } => Some(*time_remaining),
            _ => None,
        }
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            FlowState::PaymentPolling { transaction_id, .. }
            | FlowState::PaymentFailed { transaction_id, .. } => transaction_id.as_deref(),
            FlowState::PaymentSuccess { transaction_id, .. } => Some(transaction_id),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FlowState::PaymentFailed { error, .. } | FlowState::OrderFailed { error } => {
                Some(error)
            }
            FlowState::OrderCancelled { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Cancelling is allowed only until the restaurant confirms and the
    /// delivery fee is locked.
    pub fn can_cancel(&self) -> bool {
        matches!(self, FlowState::WaitingRestaurant { .. })
    }

    pub fn can_retry_payment(&self) -> bool {
        matches!(
            self,
            FlowState::PaymentRequired { .. } | FlowState::PaymentFailed { .. }
        )
    }

    fn payment_amount(&self) -> Option<BigDecimal> {
        match self {
            FlowState::PaymentProcessing { order, .. }
            | FlowState::PaymentPolling { order, .. }
            | FlowState::PaymentSuccess { order, .. }
            | FlowState::PaymentFailed { order, .. } => Some(order.summary.total.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> OrderFlowState {
        OrderFlowState {
            step: self.step(),
            order_id: self.order().map(|o| o.order_id.clone()),
            order_data: self.order().map(|o| o.summary.clone()),
            transaction_id: self.transaction_id().map(str::to_string),
            payment_amount: self.payment_amount(),
            error: self.error().map(str::to_string),
            can_cancel: self.can_cancel(),
            can_retry_payment: self.can_retry_payment(),
            time_remaining: self.time_remaining(),
        }
    }
}

/// Flat, read-only view of the flow for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrderFlowState {
    pub step: FlowStep,
    pub order_id: Option<String>,
    pub order_data: Option<OrderSummary>,
    pub transaction_id: Option<String>,
    pub payment_amount: Option<BigDecimal>,
    pub error: Option<String>,
    pub can_cancel: bool,
    pub can_retry_payment: bool,
    pub time_remaining: Option<u32>,
}

/// The single state container. Every mutation goes through one of these
/// methods while the controller holds the lock.
#[derive(Debug, Default)]
pub struct FlowMachine {
    state: FlowState,
    session: u64,
    generation: u64,
}

impl FlowMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn step(&self) -> FlowStep {
        self.state.step()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn set(&mut self, next: FlowState) {
        if next.step() != self.state.step() {
            self.generation += 1;
        }
        self.state = next;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Starts a new order. Allowed from idle or after a previous order ended.
    /// Returns the generation the creation request must report back with.
    pub fn begin_order(&mut self, restaurant_id: &str) -> FlowResult<u64> {
        let step = self.step();
        if step != FlowStep::Idle && !step.is_terminal() {
            return Err(FlowError::InvalidStep {
                operation: "create an order",
                step,
            });
        }
        self.session += 1;
        self.set(FlowState::CreatingOrder {
            restaurant_id: restaurant_id.to_string(),
        });
        Ok(self.generation)
    }

    pub fn order_created(
        &mut self,
        generation: u64,
        record: &OrderRecord,
        restaurant_timeout_secs: u32,
    ) -> Option<FlowNotice> {
        if !self.is_current(generation) || self.step() != FlowStep::CreatingOrder {
            return None;
        }
        let order = PlacedOrder::from_record(record);
        let notice = FlowNotice::OrderPlaced {
            order_id: order.order_id.clone(),
        };
        self.set(FlowState::WaitingRestaurant {
            order,
            time_remaining: restaurant_timeout_secs,
        });
        Some(notice)
    }

    pub fn order_creation_failed(&mut self, generation: u64, error: String) -> Option<FlowNotice> {
        if !self.is_current(generation) || self.step() != FlowStep::CreatingOrder {
            return None;
        }
        self.set(FlowState::OrderFailed {
            error: error.clone(),
        });
        Some(FlowNotice::OrderFailed { message: error })
    }

    /// One second elapsed. In `WaitingRestaurant` the tick that would bring
    /// the countdown to zero cancels the order; payment countdowns stop at
    /// zero.
    pub fn tick_countdown(&mut self, session: u64) -> Option<FlowNotice> {
        if session != self.session {
            return None;
        }
        let expired = match &mut self.state {
            FlowState::WaitingRestaurant {
                order,
                time_remaining,
            } => {
                if *time_remaining <= 1 {
                    Some(order.clone())
                } else {
                    *time_remaining -= 1;
                    None
                }
            }
            FlowState::PaymentProcessing { time_remaining, .. }
            | FlowState::PaymentPolling { time_remaining, .. } => {
                *time_remaining = time_remaining.saturating_sub(1);
                None
            }
            _ => None,
        }?;

        let notice = FlowNotice::RestaurantTimeout {
            order_id: expired.order_id.clone(),
        };
        self.set(FlowState::OrderCancelled {
            order: Some(expired),
            reason: RESTAURANT_TIMEOUT_REASON.to_string(),
        });
        Some(notice)
    }

    /// Applies a backend order status read that was issued at `generation`.
    pub fn apply_backend_status(
        &mut self,
        generation: u64,
        record: &OrderStatusRecord,
    ) -> Option<FlowNotice> {
        if !self.is_current(generation) {
            return None;
        }
        let order = self.state.order()?.clone();
        let order_id = order.order_id.clone();

        match record.status {
            BackendOrderStatus::Confirmed => {
                if self.step() != FlowStep::WaitingRestaurant {
                    return None;
                }
                let total = order.summary.total.clone();
                self.set(FlowState::PaymentRequired { order });
                Some(FlowNotice::RestaurantConfirmed { order_id, total })
            }
            BackendOrderStatus::Cancelled => {
                if self.step() == FlowStep::OrderCancelled {
                    return None;
                }
                let reason = record
                    .cancellation_reason
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| RESTAURANT_CANCELLED_REASON.to_string());
                self.set(FlowState::OrderCancelled {
                    order: Some(order),
                    reason: reason.clone(),
                });
                Some(FlowNotice::OrderCancelled {
                    order_id: Some(order_id),
                    reason,
                })
            }
            BackendOrderStatus::Preparing => self.advance(
                FlowState::OrderPreparing { order },
                FlowNotice::OrderPreparing { order_id },
            ),
            BackendOrderStatus::ReadyForPickup => self.advance(
                FlowState::OrderReady { order },
                FlowNotice::OrderReady { order_id },
            ),
            BackendOrderStatus::OutForDelivery => self.advance(
                FlowState::OrderDelivering { order },
                FlowNotice::OutForDelivery { order_id },
            ),
            BackendOrderStatus::Delivered => self.advance(
                FlowState::OrderCompleted { order },
                FlowNotice::OrderDelivered { order_id },
            ),
            BackendOrderStatus::Pending
            | BackendOrderStatus::PaymentPending
            | BackendOrderStatus::PaymentConfirmed
            | BackendOrderStatus::Unknown => None,
        }
    }

    /// Moves forward only; re-reading the same status is a no-op.
    fn advance(&mut self, next: FlowState, notice: FlowNotice) -> Option<FlowNotice> {
        let current = self.step().progress()?;
        let target = next.step().progress()?;
        if target <= current {
            return None;
        }
        self.set(next);
        Some(notice)
    }

    /// Enters `PaymentProcessing`. Returns the order and the generation the
    /// payment run belongs to.
    pub fn begin_payment(&mut self, payment_window_secs: u32) -> FlowResult<(PlacedOrder, u64)> {
        let order = match &self.state {
            FlowState::PaymentRequired { order } => order.clone(),
            other => {
                return Err(FlowError::InvalidStep {
                    operation: "pay",
                    step: other.step(),
                })
            }
        };
        self.set(FlowState::PaymentProcessing {
            order: order.clone(),
            time_remaining: payment_window_secs,
        });
        Ok((order, self.generation))
    }

    /// `PaymentProcessing` → `PaymentPolling`, keeping the countdown.
    pub fn payment_polling_started(&mut self, generation: u64) -> Option<u64> {
        if !self.is_current(generation) {
            return None;
        }
        match &self.state {
            FlowState::PaymentProcessing {
                order,
                time_remaining,
            } => {
                let next = FlowState::PaymentPolling {
                    order: order.clone(),
                    transaction_id: None,
                    time_remaining: *time_remaining,
                };
                self.set(next);
                Some(self.generation)
            }
            _ => None,
        }
    }

    pub fn record_transaction(&mut self, generation: u64, id: &str) {
        if !self.is_current(generation) || id.trim().is_empty() {
            return;
        }
        if let FlowState::PaymentPolling { transaction_id, .. } = &mut self.state {
            if transaction_id.as_deref() != Some(id) {
                *transaction_id = Some(id.to_string());
            }
        }
    }

    pub fn payment_finished(
        &mut self,
        generation: u64,
        result: &PaymentPollingResult,
    ) -> Option<FlowNotice> {
        if !self.is_current(generation) {
            return None;
        }
        let (order, known_transaction) = match &self.state {
            FlowState::PaymentPolling {
                order,
                transaction_id,
                ..
            } => (order.clone(), transaction_id.clone()),
            _ => return None,
        };
        let transaction_id = Some(result.transaction_id.clone())
            .filter(|id| !id.is_empty())
            .or(known_transaction);

        match result.status {
            PollStatus::Successful => {
                let transaction_id = transaction_id.unwrap_or_default();
                let notice = FlowNotice::PaymentSucceeded {
                    order_id: order.order_id.clone(),
                    transaction_id: transaction_id.clone(),
                };
                self.set(FlowState::PaymentSuccess {
                    order,
                    transaction_id,
                });
                Some(notice)
            }
            PollStatus::Failed | PollStatus::Timeout => {
                let error = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Payment failed".to_string());
                let notice = FlowNotice::PaymentFailed {
                    order_id: order.order_id.clone(),
                    message: error.clone(),
                };
                self.set(FlowState::PaymentFailed {
                    order,
                    transaction_id,
                    error,
                });
                Some(notice)
            }
            PollStatus::Cancelled => None,
        }
    }

    /// The backend reports the order paid although the flow has not seen a
    /// successful verification yet.
    pub fn mark_paid(&mut self, generation: u64, transaction_id: Option<String>) -> Option<FlowNotice> {
        if !self.is_current(generation) {
            return None;
        }
        let order = match &self.state {
            FlowState::PaymentPolling { order, .. } | FlowState::PaymentFailed { order, .. } => {
                order.clone()
            }
            _ => return None,
        };
        let transaction_id = transaction_id
            .or_else(|| self.state.transaction_id().map(str::to_string))
            .unwrap_or_default();
        let notice = FlowNotice::PaymentSucceeded {
            order_id: order.order_id.clone(),
            transaction_id: transaction_id.clone(),
        };
        self.set(FlowState::PaymentSuccess {
            order,
            transaction_id,
        });
        Some(notice)
    }

    /// The backend accepted the customer's cancel request.
    pub fn cancelled_by_customer(&mut self, session: u64) -> Option<FlowNotice> {
        if session != self.session || self.step().is_terminal() {
            return None;
        }
        let order = self.state.order().cloned();
        let order_id = order.as_ref().map(|o| o.order_id.clone());
        self.set(FlowState::OrderCancelled {
            order,
            reason: CUSTOMER_CANCELLED_REASON.to_string(),
        });
        Some(FlowNotice::OrderCancelled {
            order_id,
            reason: CUSTOMER_CANCELLED_REASON.to_string(),
        })
    }

    pub fn retry_payment(&mut self) -> FlowResult<()> {
        let order = match &self.state {
            FlowState::PaymentRequired { order } | FlowState::PaymentFailed { order, .. } => {
                order.clone()
            }
            other => {
                return Err(FlowError::RetryNotAllowed { step: other.step() });
            }
        };
        self.set(FlowState::PaymentRequired { order });
        Ok(())
    }

    pub fn reset(&mut self) {
        self.session += 1;
        self.set(FlowState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorKind;

    fn record(total: u32) -> OrderRecord {
        OrderRecord {
            id: "ord_1".to_string(),
            status: Some(BackendOrderStatus::Pending),
            subtotal: Some(BigDecimal::from(total - 500)),
            delivery_price: Some(BigDecimal::from(500)),
            total: BigDecimal::from(total),
        }
    }

    fn status(status: BackendOrderStatus) -> OrderStatusRecord {
        OrderStatusRecord {
            status,
            cancellation_reason: None,
        }
    }

    fn waiting(timeout: u32) -> FlowMachine {
        let mut machine = FlowMachine::new();
        let generation = machine.begin_order("rest_1").expect("idle flow accepts orders");
        machine
            .order_created(generation, &record(5000), timeout)
            .expect("creation applies");
        machine
    }

    #[test]
    fn test_default_state_is_idle() {
        let machine = FlowMachine::new();
        assert_eq!(machine.step(), FlowStep::Idle);
        assert_eq!(machine.state().snapshot(), OrderFlowState::default());
    }

    #[test]
    fn test_order_created_arms_countdown() {
        let machine = waiting(900);
        let snapshot = machine.state().snapshot();
        assert_eq!(snapshot.step, FlowStep::WaitingRestaurant);
        assert_eq!(snapshot.order_data.map(|d| d.total), Some(BigDecimal::from(5000)));
        assert!(snapshot.can_cancel);
        assert!(!snapshot.can_retry_payment);
        assert_eq!(snapshot.time_remaining, Some(900));
    }

    #[test]
    fn test_stale_creation_result_is_ignored() {
        let mut machine = FlowMachine::new();
        let generation = machine.begin_order("rest_1").expect("accepts");
        machine.reset();
        assert!(machine.order_created(generation, &record(5000), 900).is_none());
        assert_eq!(machine.step(), FlowStep::Idle);
    }

    #[test]
    fn test_cannot_start_second_order_mid_flow() {
        let mut machine = waiting(900);
        assert!(matches!(
            machine.begin_order("rest_2"),
            Err(FlowError::InvalidStep { .. })
        ));
    }

    #[test]
    fn test_confirmed_moves_to_payment_required() {
        let mut machine = waiting(900);
        let notice = machine.apply_backend_status(
            machine.generation(),
            &status(BackendOrderStatus::Confirmed),
        );
        assert!(matches!(notice, Some(FlowNotice::RestaurantConfirmed { .. })));
        let snapshot = machine.state().snapshot();
        assert_eq!(snapshot.step, FlowStep::PaymentRequired);
        assert!(!snapshot.can_cancel);
        assert!(snapshot.can_retry_payment);
        assert_eq!(snapshot.time_remaining, None);
    }

    #[test]
    fn test_cancelled_wins_from_any_step_once() {
        let mut machine = waiting(900);
        let generation = machine.generation();
        machine.apply_backend_status(generation, &status(BackendOrderStatus::Preparing));
        assert_eq!(machine.step(), FlowStep::OrderPreparing);

        let record = OrderStatusRecord {
            status: BackendOrderStatus::Cancelled,
            cancellation_reason: Some("Out of stock".to_string()),
        };
        let notice = machine.apply_backend_status(machine.generation(), &record);
        assert!(notice.is_some());
        assert_eq!(machine.step(), FlowStep::OrderCancelled);
        assert_eq!(machine.state().error(), Some("Out of stock"));

        assert!(machine
            .apply_backend_status(machine.generation(), &record)
            .is_none());
    }

    #[test]
    fn test_fulfillment_is_forward_only() {
        let mut machine = waiting(900);
        machine.apply_backend_status(machine.generation(), &status(BackendOrderStatus::OutForDelivery));
        assert_eq!(machine.step(), FlowStep::OrderDelivering);

        assert!(machine
            .apply_backend_status(machine.generation(), &status(BackendOrderStatus::Preparing))
            .is_none());
        assert!(machine
            .apply_backend_status(machine.generation(), &status(BackendOrderStatus::OutForDelivery))
            .is_none());
        assert_eq!(machine.step(), FlowStep::OrderDelivering);

        machine.apply_backend_status(machine.generation(), &status(BackendOrderStatus::Delivered));
        assert_eq!(machine.step(), FlowStep::OrderCompleted);
        assert!(machine.step().is_terminal());
    }

    #[test]
    fn test_stale_status_read_is_discarded() {
        let mut machine = waiting(900);
        let stale = machine.generation();
        machine.apply_backend_status(stale, &status(BackendOrderStatus::Confirmed));
        assert!(machine
            .apply_backend_status(stale, &status(BackendOrderStatus::Cancelled))
            .is_none());
        assert_eq!(machine.step(), FlowStep::PaymentRequired);
    }

    #[test]
    fn test_countdown_cancels_exactly_at_zero() {
        let mut machine = waiting(3);
        let session = machine.session();

        assert!(machine.tick_countdown(session).is_none());
        assert_eq!(machine.state().time_remaining(), Some(2));
        assert!(machine.tick_countdown(session).is_none());
        assert_eq!(machine.state().time_remaining(), Some(1));

        let notice = machine.tick_countdown(session);
        assert!(matches!(notice, Some(FlowNotice::RestaurantTimeout { .. })));
        let snapshot = machine.state().snapshot();
        assert_eq!(snapshot.step, FlowStep::OrderCancelled);
        assert_eq!(snapshot.time_remaining, None);
        assert!(!snapshot.can_cancel);
        assert!(!snapshot.can_retry_payment);
        assert_eq!(snapshot.error.as_deref(), Some(RESTAURANT_TIMEOUT_REASON));
    }

    #[test]
    fn test_countdown_from_other_session_is_ignored() {
        let mut machine = waiting(10);
        assert!(machine.tick_countdown(machine.session() + 1).is_none());
        assert_eq!(machine.state().time_remaining(), Some(10));
    }

    #[test]
    fn test_payment_happy_path() {
        let mut machine = waiting(900);
        machine.apply_backend_status(machine.generation(), &status(BackendOrderStatus::Confirmed));

        let (order, generation) = machine.begin_payment(300).expect("payment allowed");
        assert_eq!(order.order_id, "ord_1");
        assert_eq!(machine.state().time_remaining(), Some(300));

        let generation = machine
            .payment_polling_started(generation)
            .expect("polling starts");
        machine.record_transaction(generation, "tx_1");
        assert_eq!(machine.state().transaction_id(), Some("tx_1"));
        assert_eq!(
            machine.state().snapshot().payment_amount,
            Some(BigDecimal::from(5000))
        );

        let result = PaymentPollingResult {
            success: true,
            status: PollStatus::Successful,
            transaction_id: "tx_1".to_string(),
            error: None,
            error_kind: None,
            details: None,
        };
        assert!(machine.payment_finished(generation, &result).is_some());
        assert_eq!(machine.step(), FlowStep::PaymentSuccess);
        assert_eq!(machine.state().transaction_id(), Some("tx_1"));
    }

    #[test]
    fn test_payment_failure_enables_retry() {
        let mut machine = waiting(900);
        machine.apply_backend_status(machine.generation(), &status(BackendOrderStatus::Confirmed));
        let (_, generation) = machine.begin_payment(300).expect("payment allowed");
        let generation = machine.payment_polling_started(generation).expect("polling");

        let result = PaymentPollingResult {
            success: false,
            status: PollStatus::Timeout,
            transaction_id: "tx_9".to_string(),
            error: Some("Payment confirmation timed out".to_string()),
            error_kind: Some(ErrorKind::Timeout),
            details: None,
        };
        machine.payment_finished(generation, &result);
        let snapshot = machine.state().snapshot();
        assert_eq!(snapshot.step, FlowStep::PaymentFailed);
        assert!(snapshot.can_retry_payment);
        assert_eq!(snapshot.error.as_deref(), Some("Payment confirmation timed out"));

        machine.retry_payment().expect("retry allowed");
        let snapshot = machine.state().snapshot();
        assert_eq!(snapshot.step, FlowStep::PaymentRequired);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.time_remaining, None);
    }

    #[test]
    fn test_payment_requires_payment_required_step() {
        let mut machine = waiting(900);
        assert!(matches!(
            machine.begin_payment(300),
            Err(FlowError::InvalidStep { step: FlowStep::WaitingRestaurant, .. })
        ));
        assert!(matches!(
            machine.retry_payment(),
            Err(FlowError::RetryNotAllowed { .. })
        ));
    }

    #[test]
    fn test_payment_countdown_stops_at_zero() {
        let mut machine = waiting(900);
        machine.apply_backend_status(machine.generation(), &status(BackendOrderStatus::Confirmed));
        machine.begin_payment(1).expect("payment allowed");
        let session = machine.session();
        machine.tick_countdown(session);
        machine.tick_countdown(session);
        assert_eq!(machine.state().time_remaining(), Some(0));
        assert_eq!(machine.step(), FlowStep::PaymentProcessing);
    }

    #[test]
    fn test_mark_paid_promotes_failed_payment() {
        let mut machine = waiting(900);
        machine.apply_backend_status(machine.generation(), &status(BackendOrderStatus::Confirmed));
        let (_, generation) = machine.begin_payment(300).expect("payment allowed");
        let generation = machine.payment_polling_started(generation).expect("polling");
        machine.record_transaction(generation, "tx_2");

        let notice = machine.mark_paid(generation, None);
        assert!(matches!(notice, Some(FlowNotice::PaymentSucceeded { .. })));
        assert_eq!(machine.state().transaction_id(), Some("tx_2"));
    }

    #[test]
    fn test_customer_cancel_is_terminal() {
        let mut machine = waiting(900);
        let session = machine.session();
        assert!(machine.cancelled_by_customer(session + 1).is_none());
        assert!(machine.cancelled_by_customer(session).is_some());
        assert_eq!(machine.step(), FlowStep::OrderCancelled);
        assert!(machine.cancelled_by_customer(session).is_none());
    }

    #[test]
    fn test_step_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(FlowStep::WaitingRestaurant).expect("serializes"),
            serde_json::json!("waiting_restaurant")
        );
        assert_eq!(FlowStep::OrderDelivering.to_string(), "order_delivering");
    }
}
