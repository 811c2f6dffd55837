//! Payment orchestration: initialize with bounded retry, then poll.

use crate::api::error::ApiError;
use crate::config::PaymentConfig;
use crate::payments::gateway::PaymentGateway;
use crate::payments::poller::{PaymentPoller, UpdateCallback};
use crate::payments::types::{PaymentInitRequest, PaymentPollingResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    poller: PaymentPoller,
    max_retries: u32,
    retry_delay: Duration,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: &PaymentConfig) -> Self {
        Self {
            poller: PaymentPoller::new(gateway.clone(), config),
            gateway,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }

    /// Initializes the payment up to `max_retries` times and hands the first
    /// accepted transaction to the poller, whose verdict is returned as is.
    ///
    /// A bound of zero makes no call and fails the run.
    ///
    /// Only retryable failures (network, timeout, transient server errors)
    /// lead to another attempt; validation and auth failures end the run
    /// after the attempt that produced them.
    pub async fn process_payment_with_retry(
        &self,
        request: &PaymentInitRequest,
        on_update: Option<UpdateCallback<'_>>,
        max_retries: Option<u32>,
        cancel: &CancellationToken,
    ) -> PaymentPollingResult {
        let max_attempts = max_retries.unwrap_or(self.max_retries);
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < max_attempts {
            attempt += 1;

            match self.gateway.initialize_payment(request).await {
                Ok(init) => {
                    info!(
                        order_id = %request.order_id,
                        transaction_id = %init.transaction_id,
                        attempt,
                        "payment initialized, polling for confirmation"
                    );
                    return self
                        .poller
                        .poll_payment_status(&init.transaction_id, on_update, None, cancel)
                        .await;
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        order_id = %request.order_id,
                        attempt,
                        kind = ?e.kind(),
                        error = %e,
                        "payment initialization rejected"
                    );
                    return PaymentPollingResult::from_init_error(&e);
                }
                Err(e) => {
                    if attempt < max_attempts {
                        warn!(
                            order_id = %request.order_id,
                            attempt,
                            max_attempts,
                            delay_secs = self.retry_delay.as_secs(),
                            error = %e,
                            "payment initialization failed, retrying"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                return PaymentPollingResult::cancelled(String::new(), None);
                            }
                            _ = tokio::time::sleep(self.retry_delay) => {}
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        error!(
            order_id = %request.order_id,
            attempts = attempt,
            "payment initialization failed after all attempts"
        );
        match last_error {
            Some(e) => PaymentPollingResult::from_init_error(&e),
            None => PaymentPollingResult::from_init_error(&ApiError::ServerRejected {
                status: None,
                message: "No payment attempts allowed".to_string(),
                retryable: false,
            }),
        }
    }
}
