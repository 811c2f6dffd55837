//! Order flow controller: drives one order from cart to delivery.
//!
//! All state lives in a single [`FlowMachine`] behind a mutex. User actions
//! and background tasks (countdown, order status watcher, post-payment
//! refresh) mutate it only through the machine's transition methods, so two
//! updates landing in the same instant never overwrite each other.

use crate::api::error::{ApiError, ErrorKind};
use crate::config::{FlowConfig, PaymentConfig};
use crate::flow::error::{FlowError, FlowResult};
use crate::flow::notice::{FlowNotice, FlowNotifier};
use crate::flow::state::{FlowMachine, FlowStep, OrderFlowState};
use crate::logging::mask_phone_number;
use crate::orders::service::OrderService;
use crate::orders::session::{CartStore, CustomerSession};
use crate::orders::types::{Coordinates, CreateOrderRequest, OrderItemRequest};
use crate::payments::gateway::PaymentGateway;
use crate::payments::orchestrator::PaymentOrchestrator;
use crate::payments::poller::UpdateCallback;
use crate::payments::types::{
    MobileMoneyProvider, OrderPaymentStatus, PaymentInitRequest, PaymentMethod,
    PaymentPollingResult, PaymentVerification, PollStatus,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const CREATE_ORDER_FALLBACK: &str = "Failed to create order";

/// Services the controller talks to. Everything is injected; the
/// controller owns no globals.
#[derive(Clone)]
pub struct FlowDependencies {
    pub orders: Arc<dyn OrderService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub session: Arc<dyn CustomerSession>,
    pub cart: Arc<dyn CartStore>,
    pub notifier: Arc<dyn FlowNotifier>,
}

/// What the customer enters on the payment screen.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDetails {
    pub phone: String,
    pub medium: MobileMoneyProvider,
}

struct Inner {
    flow_id: Uuid,
    deps: FlowDependencies,
    orchestrator: PaymentOrchestrator,
    config: FlowConfig,
    machine: Mutex<FlowMachine>,
    state_tx: watch::Sender<OrderFlowState>,
    shutdown: CancellationToken,
    order_scope: Mutex<CancellationToken>,
    payment_scope: Mutex<CancellationToken>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, FlowMachine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T>(&self, f: impl FnOnce(&FlowMachine) -> T) -> T {
        f(&self.lock())
    }

    /// Runs `f` against the current machine and publishes the resulting
    /// snapshot before the lock is released.
    fn update<T>(&self, f: impl FnOnce(&mut FlowMachine) -> T) -> T {
        let mut machine = self.lock();
        let out = f(&mut machine);
        let snapshot = machine.state().snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        out
    }

    /// Applies a transition and forwards its notice. Returns whether the
    /// transition took effect.
    fn apply(&self, f: impl FnOnce(&mut FlowMachine) -> Option<FlowNotice>) -> bool {
        match self.update(f) {
            Some(notice) => {
                self.deps.notifier.notify(notice);
                true
            }
            None => false,
        }
    }

    fn report_api_error(&self, err: &ApiError) {
        if err.kind() == ErrorKind::Auth {
            warn!(flow_id = %self.flow_id, "backend rejected credentials, session expired");
            self.deps.notifier.notify(FlowNotice::SessionExpired);
        }
    }

    fn renew_scope(&self, slot: &Mutex<CancellationToken>) -> CancellationToken {
        let fresh = self.shutdown.child_token();
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.cancel();
        *guard = fresh.clone();
        fresh
    }

    fn cancel_scope(&self, slot: &Mutex<CancellationToken>) {
        slot.lock().unwrap_or_else(|e| e.into_inner()).cancel();
    }

    fn current_scope(&self, slot: &Mutex<CancellationToken>) -> CancellationToken {
        slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ticks once per second for the whole order session. Only steps that
    /// carry a countdown are affected by a tick.
    async fn run_countdown(self: Arc<Self>, session: u64, scope: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = scope.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let timed_out = self.apply(|m| m.tick_countdown(session));
            if timed_out {
                info!(flow_id = %self.flow_id, "restaurant confirmation window expired");
            }

            let (current, step) = self.read(|m| (m.session(), m.step()));
            if current != session || step.is_terminal() {
                break;
            }
        }
        debug!(flow_id = %self.flow_id, session, "countdown stopped");
    }

    /// Reads the backend order status on a fixed cadence while the flow is in
    /// a step that waits on the restaurant or the courier.
    async fn watch_order_status(
        self: Arc<Self>,
        order_id: String,
        session: u64,
        scope: CancellationToken,
    ) {
        let interval = self.config.status_poll_interval();
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = scope.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (current, step, generation) =
                self.read(|m| (m.session(), m.step(), m.generation()));
            if current != session || step.is_terminal() {
                break;
            }
            if !step.polls_order_status() {
                continue;
            }

            let read = tokio::select! {
                _ = scope.cancelled() => break,
                read = self.deps.orders.get_order_status(&order_id) => read,
            };
            match read {
                Ok(record) => {
                    debug!(order_id = %order_id, status = %record.status, "order status read");
                    self.apply(|m| m.apply_backend_status(generation, &record));
                }
                Err(e) if e.kind() == ErrorKind::Auth => {
                    self.report_api_error(&e);
                    break;
                }
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "order status read failed");
                }
            }
        }
        debug!(flow_id = %self.flow_id, order_id = %order_id, "order status watcher stopped");
    }

    /// Single delayed status read after a successful payment so the flow
    /// picks up the restaurant starting preparation.
    async fn refresh_after_payment(
        self: Arc<Self>,
        order_id: String,
        session: u64,
        scope: CancellationToken,
    ) {
        tokio::select! {
            _ = scope.cancelled() => return,
            _ = tokio::time::sleep(self.config.post_payment_refresh()) => {}
        }

        let (current, generation) = self.read(|m| (m.session(), m.generation()));
        if current != session {
            return;
        }
        match self.deps.orders.get_order_status(&order_id).await {
            Ok(record) => {
                self.apply(|m| m.apply_backend_status(generation, &record));
            }
            Err(e) => {
                self.report_api_error(&e);
                warn!(order_id = %order_id, error = %e, "post-payment status refresh failed");
            }
        }
    }
}

/// Owns one order flow. Dropping the controller stops its background tasks.
pub struct OrderFlowController {
    inner: Arc<Inner>,
}

impl OrderFlowController {
    pub fn new(deps: FlowDependencies, flow: FlowConfig, payment: &PaymentConfig) -> Self {
        let orchestrator = PaymentOrchestrator::new(deps.payments.clone(), payment);
        let machine = FlowMachine::new();
        let (state_tx, _) = watch::channel(machine.state().snapshot());
        let shutdown = CancellationToken::new();

        let inner = Inner {
            flow_id: Uuid::new_v4(),
            deps,
            orchestrator,
            config: flow,
            machine: Mutex::new(machine),
            state_tx,
            order_scope: Mutex::new(shutdown.child_token()),
            payment_scope: Mutex::new(shutdown.child_token()),
            shutdown,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn state(&self) -> OrderFlowState {
        self.inner.read(|m| m.state().snapshot())
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderFlowState> {
        self.inner.state_tx.subscribe()
    }

    /// Places an order for the cart items of one restaurant.
    ///
    /// Preconditions (signed-in user, default address, coordinates, items)
    /// are checked before any transition. `coordinates` overrides the
    /// address' own location.
    pub async fn create_order_from_cart(
        &self,
        restaurant_id: &str,
        coordinates: Option<Coordinates>,
    ) -> FlowResult<OrderFlowState> {
        let inner = &self.inner;
        let user = inner
            .deps
            .session
            .current_user()
            .await
            .ok_or(FlowError::NotAuthenticated)?;
        let address = inner
            .deps
            .session
            .default_address()
            .await
            .ok_or(FlowError::MissingDeliveryAddress)?;
        let location = coordinates
            .or(address.coordinates)
            .ok_or(FlowError::MissingDeliveryLocation)?;
        let items = inner.deps.cart.items_for_restaurant(restaurant_id).await;
        if items.is_empty() {
            return Err(FlowError::EmptyCart {
                restaurant_id: restaurant_id.to_string(),
            });
        }

        let (generation, session) = inner.update(|m| {
            m.begin_order(restaurant_id)
                .map(|generation| (generation, m.session()))
        })?;
        let scope = inner.renew_scope(&inner.order_scope);
        inner.cancel_scope(&inner.payment_scope);

        let request = CreateOrderRequest {
            customer_id: user.id.clone(),
            restaurant_id: restaurant_id.to_string(),
            items: items.iter().map(OrderItemRequest::from).collect(),
            delivery_address: address.full_address(),
            delivery_latitude: location.latitude,
            delivery_longitude: location.longitude,
            payment_method: PaymentMethod::MobileMoney,
        };
        info!(
            flow_id = %inner.flow_id,
            restaurant_id,
            items = request.items.len(),
            "creating order"
        );

        match inner.deps.orders.create_order(&request).await {
            Ok(record) => {
                let timeout = inner.config.restaurant_timeout_secs;
                if !inner.apply(|m| m.order_created(generation, &record, timeout)) {
                    warn!(order_id = %record.id, "order created after the flow moved on");
                    return Err(FlowError::Superseded);
                }
                info!(order_id = %record.id, total = %record.total, "order placed");

                tokio::spawn(inner.clone().run_countdown(session, scope.clone()));
                tokio::spawn(inner.clone().watch_order_status(record.id, session, scope));
                Ok(self.state())
            }
            Err(e) => {
                error!(flow_id = %inner.flow_id, error = %e, "order creation failed");
                inner.report_api_error(&e);
                let message = match &e {
                    ApiError::Validation { message, .. } | ApiError::ServerRejected { message, .. }
                        if !message.trim().is_empty() =>
                    {
                        message.clone()
                    }
                    _ => CREATE_ORDER_FALLBACK.to_string(),
                };
                inner.apply(|m| m.order_creation_failed(generation, message));
                scope.cancel();
                Err(e.into())
            }
        }
    }

    /// Pays for a confirmed order with mobile money and waits for the
    /// payment to settle. The returned result is the orchestrator's verdict;
    /// the flow state reflects it unless the flow moved on in the meantime.
    pub async fn process_payment(
        &self,
        details: PaymentDetails,
    ) -> FlowResult<PaymentPollingResult> {
        let inner = &self.inner;
        let user = inner
            .deps
            .session
            .current_user()
            .await
            .ok_or(FlowError::NotAuthenticated)?;
        let name = user.name.filter(|n| !n.trim().is_empty());
        let email = user.email.filter(|e| !e.trim().is_empty());
        let (name, email) = match (name, email) {
            (Some(name), Some(email)) => (name, email),
            _ => return Err(FlowError::IncompleteProfile),
        };

        let window = inner.config.payment_window_secs;
        let (order, generation) = inner.update(|m| m.begin_payment(window))?;
        let scope = inner.renew_scope(&inner.payment_scope);
        let generation = inner
            .update(|m| m.payment_polling_started(generation))
            .ok_or(FlowError::Superseded)?;

        let request = PaymentInitRequest {
            order_id: order.order_id.clone(),
            method: PaymentMethod::MobileMoney,
            phone: details.phone,
            medium: details.medium,
            name,
            email,
        };
        info!(
            order_id = %order.order_id,
            medium = %request.medium,
            phone = %mask_phone_number(&request.phone),
            amount = %order.summary.total,
            "processing payment"
        );

        let record_transaction = |verification: &PaymentVerification| {
            if let Some(id) = verification.trans_id.as_deref() {
                inner.update(|m| m.record_transaction(generation, id));
            }
        };
        let on_update: UpdateCallback<'_> = &record_transaction;
        let result = inner
            .orchestrator
            .process_payment_with_retry(&request, Some(on_update), None, &scope)
            .await;

        if result.error_kind == Some(ErrorKind::Auth) {
            inner.deps.notifier.notify(FlowNotice::SessionExpired);
        }
        let applied = inner.apply(|m| m.payment_finished(generation, &result));
        if applied && result.status == PollStatus::Successful {
            info!(
                order_id = %order.order_id,
                transaction_id = %result.transaction_id,
                "payment confirmed"
            );
            inner.deps.cart.clear().await;
            let session = inner.read(|m| m.session());
            let order_scope = inner.current_scope(&inner.order_scope);
            tokio::spawn(
                inner
                    .clone()
                    .refresh_after_payment(order.order_id, session, order_scope),
            );
        } else if applied {
            warn!(
                order_id = %order.order_id,
                status = ?result.status,
                error = ?result.error,
                "payment did not complete"
            );
        }
        Ok(result)
    }

    /// Cancels the order while the restaurant has not confirmed it yet.
    pub async fn cancel_order(&self) -> FlowResult<OrderFlowState> {
        let inner = &self.inner;
        let (order_id, step, session, can_cancel) = inner.read(|m| {
            (
                m.state().order().map(|o| o.order_id.clone()),
                m.step(),
                m.session(),
                m.state().can_cancel(),
            )
        });
        if !can_cancel {
            return Err(FlowError::CancelNotAllowed { step });
        }
        let order_id = order_id.ok_or(FlowError::MissingOrder)?;

        if let Err(e) = inner.deps.orders.cancel_order(&order_id).await {
            error!(order_id = %order_id, error = %e, "order cancellation failed");
            inner.report_api_error(&e);
            return Err(e.into());
        }

        if inner.apply(|m| m.cancelled_by_customer(session)) {
            info!(order_id = %order_id, "order cancelled by customer");
            inner.cancel_scope(&inner.order_scope);
            inner.cancel_scope(&inner.payment_scope);
        }
        Ok(self.state())
    }

    /// Returns to `payment_required` so the customer can pay again.
    pub fn retry_payment(&self) -> FlowResult<OrderFlowState> {
        self.inner.update(|m| m.retry_payment())?;
        self.inner.cancel_scope(&self.inner.payment_scope);
        Ok(self.state())
    }

    /// Asks the backend whether the order is already paid. A paid order
    /// still shown as polling or failed is promoted to `payment_success`.
    pub async fn refresh_payment_status(&self) -> FlowResult<Option<OrderPaymentStatus>> {
        let inner = &self.inner;
        let (order_id, generation, session) = inner.read(|m| {
            (
                m.state().order().map(|o| o.order_id.clone()),
                m.generation(),
                m.session(),
            )
        });
        let order_id = order_id.ok_or(FlowError::MissingOrder)?;

        let status = inner.deps.payments.check_order_payment_status(&order_id).await;
        let paid = status.as_ref().filter(|s| s.paid);
        if let Some(paid) = paid {
            let transaction_id = paid.trans_id.clone();
            if inner.apply(|m| m.mark_paid(generation, transaction_id)) {
                info!(order_id = %order_id, "backend reports order paid");
                inner.cancel_scope(&inner.payment_scope);
                inner.deps.cart.clear().await;
                let order_scope = inner.current_scope(&inner.order_scope);
                tokio::spawn(
                    inner
                        .clone()
                        .refresh_after_payment(order_id, session, order_scope),
                );
            }
        }
        Ok(status)
    }

    /// Abandons the current order locally and returns to idle.
    pub fn reset(&self) {
        let inner = &self.inner;
        inner.cancel_scope(&inner.payment_scope);
        inner.cancel_scope(&inner.order_scope);
        inner.update(|m| m.reset());
        debug!(flow_id = %inner.flow_id, "flow reset");
    }

    /// Stops every background task. The current state stays readable.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn step(&self) -> FlowStep {
        self.inner.read(|m| m.step())
    }
}

impl Drop for OrderFlowController {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
