//! Client-side order and mobile-money payment flow for the delivery app.

pub mod api;
pub mod config;
pub mod flow;
pub mod logging;
pub mod orders;
pub mod payments;
