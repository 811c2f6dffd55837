//! In-memory stand-ins for the backend used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use delivery_flow::api::{ApiError, ApiResult};
use delivery_flow::config::{FlowConfig, PaymentConfig};
use delivery_flow::flow::{
    FlowDependencies, FlowNotice, FlowNotifier, OrderFlowController,
};
use delivery_flow::orders::{
    BackendOrderStatus, CartItem, Coordinates, CreateOrderRequest, Customer, DeliveryAddress,
    InMemoryCart, InMemorySession, OrderRecord, OrderService, OrderStatusRecord,
};
use delivery_flow::payments::gateway::validate_init_request;
use delivery_flow::payments::{
    OrderPaymentStatus, PaymentGateway, PaymentInitRequest, PaymentInitResponse,
    PaymentVerification, VerificationStatus,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Pops the front of the queue while more than one entry remains, so the
/// last scripted answer repeats forever.
fn next_sticky<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

pub struct FakeOrderService {
    create_result: Mutex<ApiResult<OrderRecord>>,
    statuses: Mutex<VecDeque<ApiResult<OrderStatusRecord>>>,
    cancel_result: Mutex<ApiResult<()>>,
    pub created: Mutex<Vec<CreateOrderRequest>>,
    pub status_reads: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl FakeOrderService {
    pub fn new(record: OrderRecord) -> Self {
        Self {
            create_result: Mutex::new(Ok(record)),
            statuses: Mutex::new(VecDeque::from(vec![Ok(status(BackendOrderStatus::Pending))])),
            cancel_result: Mutex::new(Ok(())),
            created: Mutex::new(Vec::new()),
            status_reads: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_creation(&self, err: ApiError) {
        *self.create_result.lock().unwrap() = Err(err);
    }

    pub fn script_statuses(&self, statuses: Vec<ApiResult<OrderStatusRecord>>) {
        *self.statuses.lock().unwrap() = VecDeque::from(statuses);
    }

    pub fn fail_cancel(&self, err: ApiError) {
        *self.cancel_result.lock().unwrap() = Err(err);
    }
}

#[async_trait]
impl OrderService for FakeOrderService {
    async fn create_order(&self, request: &CreateOrderRequest) -> ApiResult<OrderRecord> {
        self.created.lock().unwrap().push(request.clone());
        self.create_result.lock().unwrap().clone()
    }

    async fn get_order_status(&self, _order_id: &str) -> ApiResult<OrderStatusRecord> {
        self.status_reads.fetch_add(1, Ordering::SeqCst);
        next_sticky(&self.statuses).unwrap_or_else(|| Ok(status(BackendOrderStatus::Pending)))
    }

    async fn cancel_order(&self, _order_id: &str) -> ApiResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancel_result.lock().unwrap().clone()
    }
}

/// Gateway double. Validates requests the same way the HTTP gateway does,
/// then answers from scripted queues.
pub struct FakeGateway {
    init_results: Mutex<VecDeque<ApiResult<PaymentInitResponse>>>,
    readings: Mutex<VecDeque<Option<PaymentVerification>>>,
    order_status: Mutex<Option<OrderPaymentStatus>>,
    pub init_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            init_results: Mutex::new(VecDeque::from(vec![Ok(init_response("tx_1"))])),
            readings: Mutex::new(VecDeque::from(vec![None])),
            order_status: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn script_init(&self, results: Vec<ApiResult<PaymentInitResponse>>) {
        *self.init_results.lock().unwrap() = VecDeque::from(results);
    }

    pub fn script_readings(&self, readings: Vec<Option<PaymentVerification>>) {
        *self.readings.lock().unwrap() = VecDeque::from(readings);
    }

    pub fn set_order_status(&self, status: Option<OrderPaymentStatus>) {
        *self.order_status.lock().unwrap() = status;
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize_payment(
        &self,
        request: &PaymentInitRequest,
    ) -> ApiResult<PaymentInitResponse> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        validate_init_request(request, "237")?;
        next_sticky(&self.init_results).unwrap_or_else(|| Ok(init_response("tx_1")))
    }

    async fn verify_payment_status(&self, _transaction_id: &str) -> Option<PaymentVerification> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        next_sticky(&self.readings).flatten()
    }

    async fn check_order_payment_status(&self, _order_id: &str) -> Option<OrderPaymentStatus> {
        self.order_status.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<FlowNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<FlowNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&FlowNotice) -> bool) -> usize {
        self.notices.lock().unwrap().iter().filter(|n| predicate(n)).count()
    }
}

impl FlowNotifier for RecordingNotifier {
    fn notify(&self, notice: FlowNotice) {
        self.notices.lock().unwrap().push(notice);
    }
}

pub fn status(status: BackendOrderStatus) -> OrderStatusRecord {
    OrderStatusRecord {
        status,
        cancellation_reason: None,
    }
}

pub fn order_record(id: &str, subtotal: u32, delivery: u32) -> OrderRecord {
    OrderRecord {
        id: id.to_string(),
        status: Some(BackendOrderStatus::Pending),
        subtotal: Some(BigDecimal::from(subtotal)),
        delivery_price: Some(BigDecimal::from(delivery)),
        total: BigDecimal::from(subtotal + delivery),
    }
}

pub fn init_response(transaction_id: &str) -> PaymentInitResponse {
    PaymentInitResponse {
        transaction_id: transaction_id.to_string(),
        status: VerificationStatus::Pending,
        amount: Some(BigDecimal::from(5000)),
        message: None,
    }
}

pub fn reading(transaction_id: &str, status: VerificationStatus) -> PaymentVerification {
    PaymentVerification {
        trans_id: Some(transaction_id.to_string()),
        status,
        amount: Some(BigDecimal::from(5000)),
        medium: Some("mtn".to_string()),
        financial_trans_id: None,
        reason: None,
    }
}

pub fn customer() -> Customer {
    Customer {
        id: "cust_1".to_string(),
        name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        phone: Some("650000000".to_string()),
    }
}

pub fn address() -> DeliveryAddress {
    DeliveryAddress {
        id: "addr_1".to_string(),
        label: Some("Home".to_string()),
        street: "Rue de la Joie".to_string(),
        city: Some("Douala".to_string()),
        coordinates: Some(Coordinates {
            latitude: 4.05,
            longitude: 9.7,
        }),
    }
}

pub fn cart_item(menu_item_id: &str, restaurant_id: &str, quantity: u32, price: u32) -> CartItem {
    CartItem {
        menu_item_id: menu_item_id.to_string(),
        restaurant_id: restaurant_id.to_string(),
        name: format!("Dish {}", menu_item_id),
        quantity,
        unit_price: BigDecimal::from(price),
        special_instructions: None,
    }
}

pub fn payment_config() -> PaymentConfig {
    PaymentConfig::default()
}

pub fn flow_config() -> FlowConfig {
    FlowConfig::default()
}

/// A controller wired to fakes, with a signed-in customer, a default
/// address and 4500 worth of items from `rest_1` in the cart.
pub struct Harness {
    pub controller: OrderFlowController,
    pub orders: Arc<FakeOrderService>,
    pub gateway: Arc<FakeGateway>,
    pub session: InMemorySession,
    pub cart: InMemoryCart,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub async fn new() -> Self {
        let orders = Arc::new(FakeOrderService::new(order_record("ord_1", 4500, 500)));
        let gateway = Arc::new(FakeGateway::new());
        let session = InMemorySession::new();
        let cart = InMemoryCart::new();
        let notifier = Arc::new(RecordingNotifier::default());

        session.sign_in(customer()).await;
        session.set_default_address(Some(address())).await;
        cart.add_item(cart_item("m1", "rest_1", 2, 1500)).await;
        cart.add_item(cart_item("m2", "rest_1", 1, 1500)).await;

        let deps = FlowDependencies {
            orders: orders.clone(),
            payments: gateway.clone(),
            session: Arc::new(session.clone()),
            cart: Arc::new(cart.clone()),
            notifier: notifier.clone(),
        };
        let controller = OrderFlowController::new(deps, flow_config(), &payment_config());

        Self {
            controller,
            orders,
            gateway,
            session,
            cart,
            notifier,
        }
    }
}
