use crate::api::error::{ApiError, ErrorKind};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mobile-money operator the customer pays through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MobileMoneyProvider {
    Mtn,
    Orange,
}

impl MobileMoneyProvider {
    pub const ALL: [MobileMoneyProvider; 2] = [MobileMoneyProvider::Mtn, MobileMoneyProvider::Orange];

    pub fn as_str(&self) -> &'static str {
        match self {
            MobileMoneyProvider::Mtn => "mtn",
            MobileMoneyProvider::Orange => "orange",
        }
    }

    /// Two-digit prefixes (after the leading `6`) each operator accepts.
    /// MTN and Orange both claim 65 and 66.
    pub fn allowed_prefixes(&self) -> &'static [&'static str] {
        match self {
            MobileMoneyProvider::Mtn => &["65", "66", "67", "68"],
            MobileMoneyProvider::Orange => &["65", "66", "69"],
        }
    }
}

impl fmt::Display for MobileMoneyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MobileMoneyProvider {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mtn" => Ok(MobileMoneyProvider::Mtn),
            "orange" => Ok(MobileMoneyProvider::Orange),
            other => Err(ApiError::validation(
                format!("unsupported mobile money provider: {}", other),
                Some("medium"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    MobileMoney,
}

/// Body of `POST /payments/init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitRequest {
    pub order_id: String,
    pub method: PaymentMethod,
    pub phone: String,
    pub medium: MobileMoneyProvider,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitEnvelope {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<PaymentInitData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitData {
    #[serde(rename = "transId", default)]
    pub trans_id: Option<String>,
    #[serde(default)]
    pub status: Option<VerificationStatus>,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Normalized outcome of a successful payment initialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentInitResponse {
    pub transaction_id: String,
    pub status: VerificationStatus,
    pub amount: Option<BigDecimal>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Successful,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Body of `GET /payments/verify?transId=`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentVerification {
    #[serde(rename = "transId", alias = "trans_id", default)]
    pub trans_id: Option<String>,
    pub status: VerificationStatus,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(rename = "financialTransId", default)]
    pub financial_trans_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of `GET /payments/status/{orderId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderPaymentStatus {
    pub status: String,
    #[serde(default)]
    pub paid: bool,
    #[serde(rename = "transId", alias = "trans_id", default)]
    pub trans_id: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
}

/// Terminal status of a polling run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollStatus {
    Successful,
    Failed,
    Timeout,
    /// The caller abandoned the poll before a terminal state was seen.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentPollingResult {
    pub success: bool,
    pub status: PollStatus,
    pub transaction_id: String,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub details: Option<PaymentVerification>,
}

impl PaymentPollingResult {
    pub fn successful(transaction_id: impl Into<String>, details: PaymentVerification) -> Self {
        Self {
            success: true,
            status: PollStatus::Successful,
            transaction_id: transaction_id.into(),
            error: None,
            error_kind: None,
            details: Some(details),
        }
    }

    pub fn failed(transaction_id: impl Into<String>, details: PaymentVerification) -> Self {
        let error = details
            .reason
            .clone()
            .unwrap_or_else(|| "Payment was declined".to_string());
        Self {
            success: false,
            status: PollStatus::Failed,
            transaction_id: transaction_id.into(),
            error: Some(error),
            error_kind: Some(ErrorKind::ServerRejected),
            details: Some(details),
        }
    }

    pub fn timed_out(transaction_id: impl Into<String>, last: Option<PaymentVerification>) -> Self {
        Self {
            success: false,
            status: PollStatus::Timeout,
            transaction_id: transaction_id.into(),
            error: Some("Payment confirmation timed out".to_string()),
            error_kind: Some(ErrorKind::Timeout),
            details: last,
        }
    }

    pub fn cancelled(transaction_id: impl Into<String>, last: Option<PaymentVerification>) -> Self {
        Self {
            success: false,
            status: PollStatus::Cancelled,
            transaction_id: transaction_id.into(),
            error: Some("Payment polling was cancelled".to_string()),
            error_kind: None,
            details: last,
        }
    }

    /// Failure before any transaction existed (initialization never succeeded).
    pub fn from_init_error(err: &ApiError) -> Self {
        Self {
            success: false,
            status: PollStatus::Failed,
            transaction_id: String::new(),
            error: Some(err.user_message()),
            error_kind: Some(err.kind()),
            details: None,
        }
    }
}
