use crate::api::client::ApiClient;
use crate::api::error::ApiResult;
use crate::orders::types::{CreateOrderRequest, OrderRecord, OrderStatusRecord};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn create_order(&self, request: &CreateOrderRequest) -> ApiResult<OrderRecord>;

    async fn get_order_status(&self, order_id: &str) -> ApiResult<OrderStatusRecord>;

    async fn cancel_order(&self, order_id: &str) -> ApiResult<()>;
}

/// Some endpoints wrap their payload in `{ "data": ... }`, others do not.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

pub struct HttpOrderService {
    api: ApiClient,
}

impl HttpOrderService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn create_order(&self, request: &CreateOrderRequest) -> ApiResult<OrderRecord> {
        let record = self
            .api
            .post_json::<_, Envelope<OrderRecord>>("/orders", request)
            .await?
            .into_inner();
        info!(
            order_id = %record.id,
            restaurant_id = %request.restaurant_id,
            items = request.items.len(),
            total = %record.total,
            "order created"
        );
        Ok(record)
    }

    async fn get_order_status(&self, order_id: &str) -> ApiResult<OrderStatusRecord> {
        Ok(self
            .api
            .get_json::<Envelope<OrderStatusRecord>>(&format!("/orders/{}", order_id), &[])
            .await?
            .into_inner())
    }

    async fn cancel_order(&self, order_id: &str) -> ApiResult<()> {
        self.api
            .post_empty(&format!("/orders/{}/cancel", order_id))
            .await?;
        info!(order_id, "order cancelled");
        Ok(())
    }
}
