use crate::api::error::ApiError;
use crate::flow::state::FlowStep;
use thiserror::Error;

/// Reasons a controller operation was refused or failed.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("no signed-in user")]
    NotAuthenticated,

    #[error("no default delivery address")]
    MissingDeliveryAddress,

    #[error("delivery address has no coordinates")]
    MissingDeliveryLocation,

    #[error("cart has no items for restaurant {restaurant_id}")]
    EmptyCart { restaurant_id: String },

    #[error("user profile needs a name and an email to pay")]
    IncompleteProfile,

    #[error("no order in progress")]
    MissingOrder,

    #[error("cannot {operation} while flow is {step}")]
    InvalidStep {
        operation: &'static str,
        step: FlowStep,
    },

    #[error("order can no longer be cancelled (flow is {step})")]
    CancelNotAllowed { step: FlowStep },

    #[error("payment cannot be retried (flow is {step})")]
    RetryNotAllowed { step: FlowStep },

    #[error("operation was superseded by a newer flow transition")]
    Superseded,

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type FlowResult<T> = Result<T, FlowError>;
