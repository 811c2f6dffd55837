use crate::config::PaymentConfig;
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{PaymentPollingResult, PaymentVerification, VerificationStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Invoked with every non-empty verification read.
pub type UpdateCallback<'a> = &'a (dyn Fn(&PaymentVerification) + Send + Sync);

/// Repeatedly verifies one transaction until it settles, times out or the
/// caller cancels. One poller per transaction; concurrent polls of the same
/// transaction are not deduplicated.
#[derive(Clone)]
pub struct PaymentPoller {
    gateway: Arc<dyn PaymentGateway>,
    interval: Duration,
    timeout: Duration,
}

impl PaymentPoller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: &PaymentConfig) -> Self {
        Self {
            gateway,
            interval: config.poll_interval(),
            timeout: config.poll_timeout(),
        }
    }

    pub async fn poll_payment_status(
        &self,
        transaction_id: &str,
        on_update: Option<UpdateCallback<'_>>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> PaymentPollingResult {
        let timeout = timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        let mut last: Option<PaymentVerification> = None;

        info!(
            transaction_id,
            interval_secs = self.interval.as_secs(),
            timeout_secs = timeout.as_secs(),
            "payment polling started"
        );

        loop {
            if started.elapsed() >= timeout {
                warn!(transaction_id, "payment polling timed out");
                return PaymentPollingResult::timed_out(transaction_id, last);
            }

            let observed = tokio::select! {
                _ = cancel.cancelled() => {
                    return PaymentPollingResult::cancelled(transaction_id, last);
                }
                observed = self.gateway.verify_payment_status(transaction_id) => observed,
            };

            match observed {
                Some(verification) => {
                    if let Some(callback) = on_update {
                        callback(&verification);
                    }
                    match verification.status {
                        VerificationStatus::Successful => {
                            info!(transaction_id, "payment confirmed");
                            return PaymentPollingResult::successful(transaction_id, verification);
                        }
                        VerificationStatus::Failed => {
                            warn!(
                                transaction_id,
                                reason = ?verification.reason,
                                "payment failed"
                            );
                            return PaymentPollingResult::failed(transaction_id, verification);
                        }
                        VerificationStatus::Pending | VerificationStatus::Unknown => {
                            debug!(transaction_id, status = ?verification.status, "payment still pending");
                            last = Some(verification);
                        }
                    }
                }
                None => debug!(transaction_id, "payment status unknown, polling again"),
            }

            // Never sleep past the deadline.
            let pause = self.interval.min(timeout.saturating_sub(started.elapsed()));
            tokio::select! {
                _ = cancel.cancelled() => {
                    return PaymentPollingResult::cancelled(transaction_id, last);
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
