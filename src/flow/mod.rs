//! Order flow: the step machine and the controller that drives it.

pub mod controller;
pub mod error;
pub mod notice;
pub mod state;

pub use controller::{FlowDependencies, OrderFlowController, PaymentDetails};
pub use error::{FlowError, FlowResult};
pub use notice::{FlowNotice, FlowNotifier, LogNotifier};
pub use state::{FlowMachine, FlowState, FlowStep, OrderFlowState, PlacedOrder};
