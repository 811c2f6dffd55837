use crate::api::client::ApiClient;
use crate::api::error::{ApiError, ApiResult};
use crate::logging::mask_phone_number;
use crate::payments::phone::{
    format_with_country_code, validate_with_country_code, DEFAULT_COUNTRY_CODE,
};
use crate::payments::types::{
    OrderPaymentStatus, PaymentInitEnvelope, PaymentInitRequest, PaymentInitResponse,
    PaymentVerification, VerificationStatus,
};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// The three remote payment calls the order flow depends on.
///
/// `verify_payment_status` and `check_order_payment_status` never fail:
/// any transport or server problem is logged and reported as `None`, which
/// callers must read as "unknown, keep polling".
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_payment(
        &self,
        request: &PaymentInitRequest,
    ) -> ApiResult<PaymentInitResponse>;

    async fn verify_payment_status(&self, transaction_id: &str) -> Option<PaymentVerification>;

    async fn check_order_payment_status(&self, order_id: &str) -> Option<OrderPaymentStatus>;
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

/// Checks every field locally and returns the request with the phone
/// reduced to its bare local digits.
pub fn validate_init_request(
    request: &PaymentInitRequest,
    country_code: &str,
) -> ApiResult<PaymentInitRequest> {
    if request.order_id.trim().is_empty() {
        return Err(ApiError::validation("Order ID is required", Some("orderId")));
    }
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("Customer name is required", Some("name")));
    }
    if !is_valid_email(&request.email) {
        return Err(ApiError::validation("Invalid email address", Some("email")));
    }
    if !validate_with_country_code(&request.phone, request.medium, country_code) {
        return Err(ApiError::validation(
            "Invalid phone number format",
            Some("phone"),
        ));
    }

    Ok(PaymentInitRequest {
        phone: format_with_country_code(&request.phone, country_code),
        email: request.email.trim().to_string(),
        name: request.name.trim().to_string(),
        ..request.clone()
    })
}

fn map_init_envelope(envelope: PaymentInitEnvelope) -> ApiResult<PaymentInitResponse> {
    if let Some(code) = envelope.status_code {
        if !(200..300).contains(&code) {
            return Err(ApiError::ServerRejected {
                status: Some(code),
                message: envelope
                    .message
                    .unwrap_or_else(|| "Payment initialization failed".to_string()),
                retryable: false,
            });
        }
    }

    let data = envelope.data.ok_or_else(|| ApiError::ServerRejected {
        status: envelope.status_code,
        message: "Payment initialization returned no data".to_string(),
        retryable: false,
    })?;

    let transaction_id = data
        .trans_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::ServerRejected {
            status: envelope.status_code,
            message: "Payment initialization returned no transaction id".to_string(),
            retryable: false,
        })?;

    Ok(PaymentInitResponse {
        transaction_id,
        status: data.status.unwrap_or(VerificationStatus::Pending),
        amount: data.amount,
        message: data.message.or(envelope.message),
    })
}

pub struct HttpPaymentGateway {
    api: ApiClient,
    country_code: String,
}

impl HttpPaymentGateway {
    pub fn new(api: ApiClient) -> Self {
        Self::with_country_code(api, DEFAULT_COUNTRY_CODE)
    }

    pub fn with_country_code(api: ApiClient, country_code: impl Into<String>) -> Self {
        Self {
            api,
            country_code: country_code.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initialize_payment(
        &self,
        request: &PaymentInitRequest,
    ) -> ApiResult<PaymentInitResponse> {
        let request = validate_init_request(request, &self.country_code)?;

        info!(
            order_id = %request.order_id,
            medium = %request.medium,
            phone = %mask_phone_number(&request.phone),
            "initializing mobile money payment"
        );

        let envelope: PaymentInitEnvelope = self
            .api
            .post_json("/payments/init", &request)
            .await
            .map_err(|err| match err {
                ApiError::Validation { message, field } => ApiError::Validation {
                    message: format!("Invalid payment information: {}", message),
                    field,
                },
                other => other,
            })?;

        let response = map_init_envelope(envelope)?;
        info!(
            order_id = %request.order_id,
            transaction_id = %response.transaction_id,
            "mobile money payment initialized"
        );
        Ok(response)
    }

    async fn verify_payment_status(&self, transaction_id: &str) -> Option<PaymentVerification> {
        match self
            .api
            .get_json::<PaymentVerification>("/payments/verify", &[("transId", transaction_id)])
            .await
        {
            Ok(verification) => Some(verification),
            Err(e) => {
                warn!(transaction_id, error = %e, "payment verification failed");
                None
            }
        }
    }

    async fn check_order_payment_status(&self, order_id: &str) -> Option<OrderPaymentStatus> {
        match self
            .api
            .get_json::<OrderPaymentStatus>(&format!("/payments/status/{}", order_id), &[])
            .await
        {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(order_id, error = %e, "order payment status check failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorKind;
    use crate::payments::types::{MobileMoneyProvider, PaymentInitData, PaymentMethod};

    fn request(phone: &str, medium: MobileMoneyProvider) -> PaymentInitRequest {
        PaymentInitRequest {
            order_id: "ord_42".to_string(),
            method: PaymentMethod::MobileMoney,
            phone: phone.to_string(),
            medium,
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn valid_request_gets_bare_phone() {
        let validated = validate_init_request(
            &request("+237 650 12 34 56", MobileMoneyProvider::Mtn),
            "237",
        )
        .expect("request should validate");
        assert_eq!(validated.phone, "650123456");
    }

    #[test]
    fn phone_for_wrong_provider_is_rejected() {
        let err = validate_init_request(&request("690000000", MobileMoneyProvider::Mtn), "237")
            .expect_err("orange prefix should not validate for mtn");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.user_message(), "Invalid phone number format");
    }

    #[test]
    fn missing_fields_are_rejected_in_order() {
        let mut req = request("650000000", MobileMoneyProvider::Mtn);
        req.order_id = " ".to_string();
        assert_eq!(
            validate_init_request(&req, "237").unwrap_err().user_message(),
            "Order ID is required"
        );

        let mut req = request("650000000", MobileMoneyProvider::Mtn);
        req.email = "not-an-email".to_string();
        assert_eq!(
            validate_init_request(&req, "237").unwrap_err().user_message(),
            "Invalid email address"
        );
    }

    #[test]
    fn envelope_without_transaction_is_rejected() {
        let err = map_init_envelope(PaymentInitEnvelope {
            status_code: Some(200),
            message: Some("ok".to_string()),
            data: Some(PaymentInitData {
                trans_id: None,
                status: Some(VerificationStatus::Pending),
                amount: None,
                message: None,
            }),
        })
        .expect_err("missing transId should fail");
        assert!(!err.is_retryable());
    }

    #[test]
    fn envelope_with_error_status_code_is_rejected() {
        let err = map_init_envelope(PaymentInitEnvelope {
            status_code: Some(402),
            message: Some("Insufficient balance".to_string()),
            data: None,
        })
        .expect_err("402 envelope should fail");
        assert_eq!(err.user_message(), "Insufficient balance");
    }
}
