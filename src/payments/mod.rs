//! Mobile-money payments: validation, gateway calls, polling and retry.

pub mod gateway;
pub mod orchestrator;
pub mod phone;
pub mod poller;
pub mod types;

pub use gateway::{HttpPaymentGateway, PaymentGateway};
pub use orchestrator::PaymentOrchestrator;
pub use phone::{format_phone_number, providers_for_number, validate_phone_number};
pub use poller::PaymentPoller;
pub use types::{
    MobileMoneyProvider, OrderPaymentStatus, PaymentInitRequest, PaymentInitResponse,
    PaymentMethod, PaymentPollingResult, PaymentVerification, PollStatus, VerificationStatus,
};
